//! Check method bodies and their XML form.
//!
//! A Check request carries the graded sub-problems (conditions), the user's
//! serialized answer (instructions) and optionally the PreGenerated triple
//! from an earlier Generate call. The response carries one result per
//! condition, in the original condition order.

use crate::error::BadBody;
use crate::xml::{Document, Element};

use super::generate::GeneratingResult;
use super::names;
use super::{add_pre_generated, comment_of, int_attr, optional_document, parse_pre_generated,
    request_body_to_string, require_document, response_body_to_string};

/// One graded sub-problem: identifier, time limit in seconds (non-positive
/// means the configured default applies), input and expected output.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Condition {
    pub id: i32,
    pub time_limit: i64,
    pub input: String,
    pub output: String,
}

/// Graded outcome of one condition: identifier, elapsed milliseconds, score
/// rendered as a 2-decimal fixed-point string in [0;1], and a free-text
/// comment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CheckingResult {
    pub id: i32,
    pub time: u64,
    pub result: String,
    pub comment: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct CheckRequestBody {
    pub conditions: Vec<Condition>,
    pub instructions: String,
    pub pre_generated: Option<GeneratingResult>,
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct CheckResponseBody {
    pub results: Vec<CheckingResult>,
}

impl CheckResponseBody {
    pub fn result_by_id(&self, id: i32) -> Option<&CheckingResult> {
        self.results.iter().find(|result| result.id == id)
    }
}

pub(crate) fn parse_request_body(body: &str) -> Result<CheckRequestBody, BadBody> {
    let document = require_document(body)?;
    let root = &document.root;

    let mut conditions = Vec::new();
    for element in root.descendants(names::CONDITION_FOR_CHECKING) {
        conditions.push(parse_condition(element)?);
    }
    let instructions = comment_of(root, names::INSTRUCTIONS).unwrap_or_default();
    let pre_generated = parse_pre_generated(root);

    Ok(CheckRequestBody {
        conditions,
        instructions,
        pre_generated,
    })
}

fn parse_condition(element: &Element) -> Result<Condition, BadBody> {
    Ok(Condition {
        id: int_attr(element, names::CONDITION_FOR_CHECKING, names::ID)?,
        time_limit: int_attr(element, names::CONDITION_FOR_CHECKING, names::TIME)?,
        input: comment_of(element, names::INPUT).unwrap_or_default(),
        output: comment_of(element, names::OUTPUT).unwrap_or_default(),
    })
}

pub(crate) fn serialize_request_body(body: &CheckRequestBody) -> String {
    let mut root = Element::new(names::REQUEST);
    {
        let conditions = root.add_element(names::CONDITIONS);
        for condition in &body.conditions {
            let element = conditions.add_element(names::CONDITION_FOR_CHECKING);
            element.set_attr(names::ID, condition.id.to_string());
            element.set_attr(names::TIME, condition.time_limit.to_string());
            element.add_element(names::INPUT).add_comment(&condition.input);
            element.add_element(names::OUTPUT).add_comment(&condition.output);
        }
    }
    root.add_element(names::INSTRUCTIONS)
        .add_comment(&body.instructions);
    if let Some(pre_generated) = &body.pre_generated {
        add_pre_generated(&mut root, pre_generated);
    }
    request_body_to_string(&Document { root })
}

pub(crate) fn parse_response_body(body: &str) -> Result<CheckResponseBody, BadBody> {
    let Some(document) = optional_document(body)? else {
        return Ok(CheckResponseBody::default());
    };
    let mut results = Vec::new();
    for element in document.root.descendants(names::CHECKING_RESULT) {
        results.push(CheckingResult {
            id: int_attr(element, names::CHECKING_RESULT, names::ID)?,
            time: int_attr(element, names::CHECKING_RESULT, names::TIME)?,
            result: element.attr(names::RESULT).unwrap_or_default().to_string(),
            comment: element.comment_text().map(str::to_string),
        });
    }
    Ok(CheckResponseBody { results })
}

pub(crate) fn serialize_response_body(body: &CheckResponseBody) -> String {
    let mut root = Element::new(names::RESPONSE);
    for result in &body.results {
        let element = root.add_element(names::CHECKING_RESULT);
        element.set_attr(names::ID, result.id.to_string());
        element.set_attr(names::TIME, result.time.to_string());
        element.set_attr(names::RESULT, result.result.clone());
        if let Some(comment) = &result.comment {
            element.add_comment(comment);
        }
    }
    response_body_to_string(&Document { root })
}
