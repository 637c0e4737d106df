//! Minimal XML document model for the RLCP body format.
//!
//! RLCP bodies are legacy XML in which textual payloads ride inside XML
//! comments nested in named elements, and serialized documents declare a
//! DOCTYPE system-id as a compatibility marker only. The vocabulary is small
//! and fixed, so the crate reads and prints it directly, the same way the
//! wire headers are handled.
//!
//! The reader accepts an XML declaration, a DOCTYPE (skipped), elements with
//! attributes, comments and text; entity references are resolved in text and
//! attribute values. Comment text is taken verbatim. The writer produces the
//! pretty-printed shape the protocol's fixtures use: two-space indentation,
//! one node per line.

use std::fmt::Write as _;

use thiserror::Error;

/// Errors raised while reading an XML document.
#[derive(Debug, Error)]
pub enum XmlError {
    #[error("unexpected end of xml input")]
    UnexpectedEnd,

    #[error("malformed xml at offset {0}")]
    Malformed(usize),

    #[error("mismatched closing tag </{found}>, expected </{expected}>")]
    MismatchedClose { expected: String, found: String },

    #[error("missing root element")]
    MissingRoot,

    #[error("unknown entity reference: {0:?}")]
    UnknownEntity(String),
}

/// A node in an element's child list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Node {
    Element(Element),
    Comment(String),
    Text(String),
}

/// An XML element: name, attributes in document order, children.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Element {
    pub name: String,
    pub attributes: Vec<(String, String)>,
    pub children: Vec<Node>,
}

impl Element {
    pub fn new(name: impl Into<String>) -> Self {
        Element {
            name: name.into(),
            attributes: Vec::new(),
            children: Vec::new(),
        }
    }

    /// Value of the named attribute, if present.
    pub fn attr(&self, name: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, v)| v.as_str())
    }

    /// Sets an attribute, replacing an existing value of the same name.
    pub fn set_attr(&mut self, name: impl Into<String>, value: impl Into<String>) {
        let name = name.into();
        if let Some(slot) = self.attributes.iter_mut().find(|(n, _)| *n == name) {
            slot.1 = value.into();
        } else {
            self.attributes.push((name, value.into()));
        }
    }

    /// Appends a child element and returns a reference to it for builder
    /// style construction.
    pub fn add_element(&mut self, name: impl Into<String>) -> &mut Element {
        self.children.push(Node::Element(Element::new(name)));
        match self.children.last_mut() {
            Some(Node::Element(element)) => element,
            _ => unreachable!("just pushed an element"),
        }
    }

    /// Appends a comment child.
    pub fn add_comment(&mut self, text: impl Into<String>) {
        self.children.push(Node::Comment(text.into()));
    }

    pub fn child_elements(&self) -> impl Iterator<Item = &Element> {
        self.children.iter().filter_map(|node| match node {
            Node::Element(element) => Some(element),
            _ => None,
        })
    }

    /// First direct child element with the given name.
    pub fn child(&self, name: &str) -> Option<&Element> {
        self.child_elements().find(|element| element.name == name)
    }

    /// First comment child - the way RLCP carries text payloads.
    pub fn comment_text(&self) -> Option<&str> {
        self.children.iter().find_map(|node| match node {
            Node::Comment(text) => Some(text.as_str()),
            _ => None,
        })
    }

    /// Depth-first search for a descendant element, self excluded.
    pub fn descendant(&self, name: &str) -> Option<&Element> {
        for element in self.child_elements() {
            if element.name == name {
                return Some(element);
            }
            if let Some(found) = element.descendant(name) {
                return Some(found);
            }
        }
        None
    }

    /// All descendant elements with the given name, in document order.
    pub fn descendants(&self, name: &str) -> Vec<&Element> {
        let mut found = Vec::new();
        self.collect_descendants(name, &mut found);
        found
    }

    fn collect_descendants<'a>(&'a self, name: &str, found: &mut Vec<&'a Element>) {
        for element in self.child_elements() {
            if element.name == name {
                found.push(element);
            }
            element.collect_descendants(name, found);
        }
    }
}

/// A parsed XML document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Document {
    pub root: Element,
}

impl Document {
    pub fn parse(input: &str) -> Result<Document, XmlError> {
        let mut reader = Reader { input, pos: 0 };
        let root = reader.parse_document()?;
        Ok(Document { root })
    }

    /// Pretty-prints the document, optionally declaring a
    /// `<!DOCTYPE name SYSTEM "system-id">` after the XML declaration.
    pub fn to_pretty_string(&self, doctype: Option<(&str, &str)>) -> String {
        let mut out = String::from("<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n");
        if let Some((name, system_id)) = doctype {
            let _ = writeln!(out, "<!DOCTYPE {name} SYSTEM \"{system_id}\">");
            out.push('\n');
        }
        write_element(&mut out, &self.root, 0);
        out
    }
}

fn write_element(out: &mut String, element: &Element, depth: usize) {
    let indent = "  ".repeat(depth);
    out.push_str(&indent);
    out.push('<');
    out.push_str(&element.name);
    for (name, value) in &element.attributes {
        let _ = write!(out, " {}=\"{}\"", name, escape_attr(value));
    }
    if element.children.is_empty() {
        out.push_str("/>\n");
        return;
    }
    out.push_str(">\n");
    for child in &element.children {
        match child {
            Node::Element(element) => write_element(out, element, depth + 1),
            Node::Comment(text) => {
                let _ = writeln!(out, "{indent}  <!--{text}-->");
            }
            Node::Text(text) => {
                let _ = writeln!(out, "{indent}  {}", escape_text(text));
            }
        }
    }
    let _ = writeln!(out, "{indent}</{}>", element.name);
}

fn escape_text(text: &str) -> String {
    text.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
}

fn escape_attr(value: &str) -> String {
    escape_text(value).replace('"', "&quot;")
}

fn unescape(text: &str) -> Result<String, XmlError> {
    if !text.contains('&') {
        return Ok(text.to_string());
    }
    let mut out = String::with_capacity(text.len());
    let mut rest = text;
    while let Some(idx) = rest.find('&') {
        out.push_str(&rest[..idx]);
        rest = &rest[idx + 1..];
        let end = rest
            .find(';')
            .ok_or_else(|| XmlError::UnknownEntity(rest.chars().take(8).collect()))?;
        let entity = &rest[..end];
        match entity {
            "amp" => out.push('&'),
            "lt" => out.push('<'),
            "gt" => out.push('>'),
            "quot" => out.push('"'),
            "apos" => out.push('\''),
            _ => {
                let code = if let Some(hex) = entity.strip_prefix("#x").or(entity.strip_prefix("#X"))
                {
                    u32::from_str_radix(hex, 16).ok()
                } else if let Some(dec) = entity.strip_prefix('#') {
                    dec.parse().ok()
                } else {
                    None
                };
                let ch = code
                    .and_then(char::from_u32)
                    .ok_or_else(|| XmlError::UnknownEntity(entity.to_string()))?;
                out.push(ch);
            }
        }
        rest = &rest[end + 1..];
    }
    out.push_str(rest);
    Ok(out)
}

struct Reader<'a> {
    input: &'a str,
    pos: usize,
}

impl Reader<'_> {
    fn parse_document(&mut self) -> Result<Element, XmlError> {
        loop {
            self.skip_whitespace();
            if self.pos >= self.input.len() {
                return Err(XmlError::MissingRoot);
            }
            if self.starts_with("<?") {
                self.skip_until("?>")?;
            } else if self.starts_with("<!--") {
                self.pos += 4;
                self.read_until("-->")?;
            } else if self.starts_with("<!") {
                self.skip_doctype()?;
            } else if self.starts_with("<") {
                let root = self.parse_element()?;
                loop {
                    self.skip_whitespace();
                    if self.pos >= self.input.len() {
                        return Ok(root);
                    }
                    if self.starts_with("<!--") {
                        self.pos += 4;
                        self.read_until("-->")?;
                    } else {
                        return Err(XmlError::Malformed(self.pos));
                    }
                }
            } else {
                return Err(XmlError::Malformed(self.pos));
            }
        }
    }

    fn parse_element(&mut self) -> Result<Element, XmlError> {
        self.pos += 1; // consume '<'
        let name = self.read_name()?;
        let mut element = Element::new(name);

        // attribute list and tag close
        loop {
            self.skip_whitespace();
            match self.peek() {
                None => return Err(XmlError::UnexpectedEnd),
                Some(b'/') => {
                    self.pos += 1;
                    self.expect(b'>')?;
                    return Ok(element);
                }
                Some(b'>') => {
                    self.pos += 1;
                    break;
                }
                Some(_) => {
                    let attr_name = self.read_name()?;
                    self.skip_whitespace();
                    self.expect(b'=')?;
                    self.skip_whitespace();
                    let value = self.read_quoted()?;
                    element.set_attr(attr_name, value);
                }
            }
        }

        // children until the matching closing tag
        loop {
            if self.starts_with("</") {
                self.pos += 2;
                let close = self.read_name()?;
                self.skip_whitespace();
                self.expect(b'>')?;
                if close != element.name {
                    return Err(XmlError::MismatchedClose {
                        expected: element.name,
                        found: close,
                    });
                }
                return Ok(element);
            } else if self.starts_with("<!--") {
                self.pos += 4;
                let text = self.read_until("-->")?;
                element.children.push(Node::Comment(text));
            } else if self.starts_with("<") {
                let child = self.parse_element()?;
                element.children.push(Node::Element(child));
            } else if self.pos >= self.input.len() {
                return Err(XmlError::UnexpectedEnd);
            } else {
                let text = self.read_text()?;
                if !text.trim().is_empty() {
                    element.children.push(Node::Text(text.trim().to_string()));
                }
            }
        }
    }

    fn peek(&self) -> Option<u8> {
        self.input.as_bytes().get(self.pos).copied()
    }

    fn starts_with(&self, prefix: &str) -> bool {
        self.input[self.pos..].starts_with(prefix)
    }

    fn expect(&mut self, byte: u8) -> Result<(), XmlError> {
        match self.peek() {
            Some(found) if found == byte => {
                self.pos += 1;
                Ok(())
            }
            Some(_) => Err(XmlError::Malformed(self.pos)),
            None => Err(XmlError::UnexpectedEnd),
        }
    }

    fn skip_whitespace(&mut self) {
        while let Some(byte) = self.peek() {
            if byte.is_ascii_whitespace() {
                self.pos += 1;
            } else {
                break;
            }
        }
    }

    fn read_name(&mut self) -> Result<String, XmlError> {
        let start = self.pos;
        while let Some(byte) = self.peek() {
            if byte.is_ascii_alphanumeric() || matches!(byte, b'_' | b'-' | b'.' | b':') {
                self.pos += 1;
            } else {
                break;
            }
        }
        if self.pos == start {
            return Err(XmlError::Malformed(self.pos));
        }
        Ok(self.input[start..self.pos].to_string())
    }

    fn read_quoted(&mut self) -> Result<String, XmlError> {
        let quote = match self.peek() {
            Some(byte @ (b'"' | b'\'')) => byte,
            Some(_) => return Err(XmlError::Malformed(self.pos)),
            None => return Err(XmlError::UnexpectedEnd),
        };
        self.pos += 1;
        let start = self.pos;
        while let Some(byte) = self.peek() {
            if byte == quote {
                let raw = &self.input[start..self.pos];
                self.pos += 1;
                return unescape(raw);
            }
            self.pos += 1;
        }
        Err(XmlError::UnexpectedEnd)
    }

    /// Consumes raw input up to and including `marker`, returning the text
    /// before it verbatim.
    fn read_until(&mut self, marker: &str) -> Result<String, XmlError> {
        match self.input[self.pos..].find(marker) {
            Some(idx) => {
                let text = self.input[self.pos..self.pos + idx].to_string();
                self.pos += idx + marker.len();
                Ok(text)
            }
            None => Err(XmlError::UnexpectedEnd),
        }
    }

    fn skip_until(&mut self, marker: &str) -> Result<(), XmlError> {
        self.read_until(marker).map(|_| ())
    }

    fn skip_doctype(&mut self) -> Result<(), XmlError> {
        // internal subsets nest square brackets inside the declaration
        let mut in_subset = false;
        while let Some(byte) = self.peek() {
            self.pos += 1;
            match byte {
                b'[' => in_subset = true,
                b']' => in_subset = false,
                b'>' if !in_subset => return Ok(()),
                _ => {}
            }
        }
        Err(XmlError::UnexpectedEnd)
    }

    fn read_text(&mut self) -> Result<String, XmlError> {
        let start = self.pos;
        while let Some(byte) = self.peek() {
            if byte == b'<' {
                break;
            }
            self.pos += 1;
        }
        unescape(&self.input[start..self.pos])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_element_tree() {
        let doc = Document::parse(
            "<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n\
             <!DOCTYPE Request SYSTEM \"http://de.ifmo.ru/--DTD/Request.dtd\">\n\
             <Request>\n\
               <Conditions>\n\
                 <ConditionForChecking id=\"1\" Time=\"5\">\n\
                   <Input>\n\
                     <!--first input-->\n\
                   </Input>\n\
                 </ConditionForChecking>\n\
               </Conditions>\n\
             </Request>",
        )
        .unwrap();

        assert_eq!(doc.root.name, "Request");
        let condition = doc.root.descendant("ConditionForChecking").unwrap();
        assert_eq!(condition.attr("id"), Some("1"));
        assert_eq!(condition.attr("Time"), Some("5"));
        let input = condition.child("Input").unwrap();
        assert_eq!(input.comment_text(), Some("first input"));
    }

    #[test]
    fn test_comment_text_is_verbatim() {
        let doc = Document::parse("<Root><!-- spaced  text --></Root>").unwrap();
        assert_eq!(doc.root.comment_text(), Some(" spaced  text "));
    }

    #[test]
    fn test_entities_in_attributes_and_text() {
        let doc = Document::parse("<Root name=\"a &amp; b &lt;c&gt;\">x &amp; y</Root>").unwrap();
        assert_eq!(doc.root.attr("name"), Some("a & b <c>"));
        assert_eq!(doc.root.children, vec![Node::Text("x & y".to_string())]);
    }

    #[test]
    fn test_pretty_print_shape() {
        let mut root = Element::new("Request");
        let conditions = root.add_element("Conditions");
        let condition = conditions.add_element("ConditionForChecking");
        condition.set_attr("id", "1");
        condition.set_attr("Time", "5");
        condition.add_element("Input").add_comment("payload");

        let doc = Document { root };
        let printed = doc.to_pretty_string(Some(("Request", "http://de.ifmo.ru/--DTD/Request.dtd")));
        assert_eq!(
            printed,
            "<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n\
             <!DOCTYPE Request SYSTEM \"http://de.ifmo.ru/--DTD/Request.dtd\">\n\
             \n\
             <Request>\n  \
               <Conditions>\n    \
                 <ConditionForChecking id=\"1\" Time=\"5\">\n      \
                   <Input>\n        \
                     <!--payload-->\n      \
                   </Input>\n    \
                 </ConditionForChecking>\n  \
               </Conditions>\n\
             </Request>\n"
        );
    }

    #[test]
    fn test_round_trip() {
        let mut root = Element::new("Response");
        let result = root.add_element("CheckingResult");
        result.set_attr("id", "2");
        result.set_attr("Result", "0.50");
        result.add_comment("ok");
        let doc = Document { root };

        let reparsed = Document::parse(&doc.to_pretty_string(None)).unwrap();
        assert_eq!(reparsed, doc);
    }

    #[test]
    fn test_empty_element_round_trip() {
        let doc = Document::parse("<Response/>").unwrap();
        assert!(doc.root.children.is_empty());
        assert_eq!(Document::parse(&doc.to_pretty_string(None)).unwrap(), doc);
    }

    #[test]
    fn test_mismatched_close_is_rejected() {
        match Document::parse("<Request><Input></Output></Request>") {
            Err(XmlError::MismatchedClose { expected, found }) => {
                assert_eq!(expected, "Input");
                assert_eq!(found, "Output");
            }
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[test]
    fn test_truncated_document_is_rejected() {
        assert!(matches!(
            Document::parse("<Request><Input>"),
            Err(XmlError::UnexpectedEnd)
        ));
        assert!(matches!(Document::parse("   "), Err(XmlError::MissingRoot)));
    }
}
