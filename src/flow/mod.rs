//! Per-method request processing under the whole-request deadline.
//!
//! Processors are synchronous and may block, so a request body is processed
//! on a blocking thread and awaited under `Config::request_flow_time_limit`.
//! Deadline expiry or a panicked flow yields a [`FlowError`], which the
//! connection server turns into an Unavailable response - never a partial
//! body. Generate and Calculate degrade to diagnostic placeholder bodies
//! when no processor is registered; Check has its own engine in
//! [`check`].

pub mod check;

use std::sync::Arc;

use tracing::warn;

use crate::config::Config;
use crate::error::FlowError;
use crate::methods::calculate::{CalculateRequestBody, CalculateResponseBody, CalculatingResult};
use crate::methods::generate::{GenerateRequestBody, GenerateResponseBody, GeneratingResult};
use crate::methods::{RequestBody, ResponseBody};
use crate::processor::ProcessorRegistry;
use crate::protocol::{Request, Response};

/// Processes one request end to end, bounded by the configured flow
/// deadline.
pub async fn process_request(
    request: Request,
    registry: Arc<ProcessorRegistry>,
    config: Arc<Config>,
) -> Result<Response, FlowError> {
    let deadline = config.request_flow_time_limit;
    let method = request.header.method;

    let task = tokio::task::spawn_blocking(move || process_body(&registry, request.body, &config));
    let body = match tokio::time::timeout(deadline, task).await {
        Ok(Ok(body)) => body,
        Ok(Err(join_error)) => return Err(FlowError::Processing(join_error.to_string())),
        Err(_) => return Err(FlowError::DeadlineExceeded(deadline)),
    };

    method
        .build_response(body)
        .map_err(|err| FlowError::Processing(err.to_string()))
}

/// Per-method body dispatch.
pub fn process_body(
    registry: &ProcessorRegistry,
    body: RequestBody,
    config: &Config,
) -> ResponseBody {
    match body {
        RequestBody::Generate(body) => ResponseBody::Generate(process_generate(registry, body)),
        RequestBody::Check(body) => ResponseBody::Check(check::process_body(registry, body, config)),
        RequestBody::Calculate(body) => ResponseBody::Calculate(process_calculate(registry, body)),
        RequestBody::Echo => ResponseBody::Echo,
    }
}

fn process_generate(registry: &ProcessorRegistry, body: GenerateRequestBody) -> GenerateResponseBody {
    let Some(processor) = registry.generate() else {
        let msg = "no Generate processor registered";
        warn!("{msg}");
        return GenerateResponseBody {
            result: GeneratingResult::new(msg, msg, msg),
        };
    };
    GenerateResponseBody {
        result: processor.generate(&body.condition),
    }
}

fn process_calculate(
    registry: &ProcessorRegistry,
    body: CalculateRequestBody,
) -> CalculateResponseBody {
    let Some(processor) = registry.calculate() else {
        let msg = "no Calculate processor registered";
        warn!("{msg}");
        return CalculateResponseBody {
            result: CalculatingResult::new(msg, msg),
        };
    };
    CalculateResponseBody {
        result: processor.calculate(
            &body.condition,
            &body.instructions,
            body.pre_generated.as_ref(),
        ),
    }
}
