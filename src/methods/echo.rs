//! Echo method: empty request and response bodies.
//!
//! Echo exchanges carry headers only; both bodies serialize to the empty
//! string and any body text is ignored on parse. The method exists so a
//! client can probe that a server is alive and authenticating.

#[cfg(test)]
mod tests {
    use crate::methods::{Method, RequestBody, ResponseBody};

    #[test]
    fn test_echo_bodies_are_unit() {
        assert_eq!(
            Method::Echo.parse_request_body("").unwrap(),
            RequestBody::Echo
        );
        assert_eq!(
            Method::Echo.parse_response_body("ignored").unwrap(),
            ResponseBody::Echo
        );
    }
}
