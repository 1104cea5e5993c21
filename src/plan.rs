use axum::http::header::{
    ACCESS_CONTROL_ALLOW_HEADERS, ACCESS_CONTROL_EXPOSE_HEADERS, CONTENT_TYPE,
};
use axum::http::{HeaderMap, HeaderValue, Method, StatusCode};
use axum_extra::headers::{AcceptRanges, ContentLength, ContentRange, HeaderMapExt};

use crate::range::{ByteWindow, RangeOutcome};
use crate::resource::{ResourceDescriptor, OCTET_STREAM};

/// Which bytes of the resource go into the response body.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BodyPlan {
    Full,
    Window(ByteWindow),
    /// Headers only.
    Empty,
}

/// Status, headers and body plan for one response, computed before any
/// byte of the resource is read.
#[derive(Debug, Clone)]
pub struct DeliveryDecision {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: BodyPlan,
}

impl DeliveryDecision {
    /// Drops the body for anything but `GET`, keeping status and headers.
    pub fn for_method(mut self, method: &Method) -> Self {
        if *method != Method::GET {
            self.body = BodyPlan::Empty;
        }
        self
    }
}

/// Maps a parsed `Range` outcome onto the response for `resource`.
pub fn plan(outcome: RangeOutcome, resource: &ResourceDescriptor) -> DeliveryDecision {
    let size = resource.size;
    let mut headers = HeaderMap::new();

    match outcome {
        RangeOutcome::NoRange => {
            headers.typed_insert(AcceptRanges::bytes());
            headers.typed_insert(ContentLength(size));
            headers.insert(CONTENT_TYPE, content_type(resource));
            headers.insert(
                ACCESS_CONTROL_EXPOSE_HEADERS,
                HeaderValue::from_static("Accept-Ranges"),
            );
            headers.insert(
                ACCESS_CONTROL_ALLOW_HEADERS,
                HeaderValue::from_static("Accept-Ranges,range"),
            );
            DeliveryDecision { status: StatusCode::OK, headers, body: BodyPlan::Full }
        }
        RangeOutcome::Window(window) => {
            let content_range = ContentRange::bytes(window.start()..=window.end(), size)
                .expect("ContentRange::bytes cannot panic for a validated window");
            headers.typed_insert(content_range);
            headers.typed_insert(AcceptRanges::bytes());
            headers.typed_insert(ContentLength(window.len()));
            headers.insert(CONTENT_TYPE, content_type(resource));
            DeliveryDecision {
                status: StatusCode::PARTIAL_CONTENT,
                headers,
                body: BodyPlan::Window(window),
            }
        }
        RangeOutcome::Unsatisfiable(reason) => {
            tracing::debug!(id = %resource.id, %reason, "range not satisfiable");
            headers.typed_insert(ContentRange::unsatisfied_bytes(size));
            DeliveryDecision {
                status: StatusCode::RANGE_NOT_SATISFIABLE,
                headers,
                body: BodyPlan::Empty,
            }
        }
    }
}

pub(crate) fn content_type(resource: &ResourceDescriptor) -> HeaderValue {
    HeaderValue::from_str(&resource.content_type)
        .unwrap_or_else(|_| HeaderValue::from_static(OCTET_STREAM))
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;

    use super::*;

    fn pdf(size: u64) -> ResourceDescriptor {
        ResourceDescriptor {
            id: "19mb_2.pdf".to_string(),
            size,
            content_type: "application/pdf".to_string(),
        }
    }

    fn header<'a>(decision: &'a DeliveryDecision, name: &str) -> Option<&'a str> {
        decision.headers.get(name).map(|v| v.to_str().unwrap())
    }

    #[test]
    fn test_no_range() {
        let decision = plan(RangeOutcome::NoRange, &pdf(1000));

        assert_eq!(StatusCode::OK, decision.status);
        assert_eq!(BodyPlan::Full, decision.body);
        assert_eq!(Some("bytes"), header(&decision, "accept-ranges"));
        assert_eq!(Some("1000"), header(&decision, "content-length"));
        assert_eq!(Some("application/pdf"), header(&decision, "content-type"));
        assert_eq!(Some("Accept-Ranges"), header(&decision, "access-control-expose-headers"));
        assert_eq!(Some("Accept-Ranges,range"), header(&decision, "access-control-allow-headers"));
        assert_eq!(None, header(&decision, "content-range"));
    }

    #[test]
    fn test_window() {
        let outcome = RangeOutcome::parse(Some("bytes=200-299"), 1000);
        let decision = plan(outcome, &pdf(1000));

        assert_eq!(StatusCode::PARTIAL_CONTENT, decision.status);
        assert_matches!(decision.body, BodyPlan::Window(w) if w.start() == 200 && w.end() == 299);
        assert_eq!(Some("bytes 200-299/1000"), header(&decision, "content-range"));
        assert_eq!(Some("100"), header(&decision, "content-length"));
        assert_eq!(Some("bytes"), header(&decision, "accept-ranges"));
        assert_eq!(Some("application/pdf"), header(&decision, "content-type"));
    }

    #[test]
    fn test_content_range_uses_resolved_bounds() {
        let decision = plan(RangeOutcome::parse(Some("bytes=200-"), 1000), &pdf(1000));
        assert_eq!(Some("bytes 200-999/1000"), header(&decision, "content-range"));
        assert_eq!(Some("800"), header(&decision, "content-length"));

        let decision = plan(RangeOutcome::parse(Some("bytes=-500"), 1000), &pdf(1000));
        assert_eq!(Some("bytes 500-999/1000"), header(&decision, "content-range"));
        assert_eq!(Some("500"), header(&decision, "content-length"));
    }

    #[test]
    fn test_unsatisfiable() {
        let outcome = RangeOutcome::parse(Some("bytes=1000-1100"), 1000);
        let decision = plan(outcome, &pdf(1000));

        assert_eq!(StatusCode::RANGE_NOT_SATISFIABLE, decision.status);
        assert_eq!(BodyPlan::Empty, decision.body);
        assert_eq!(Some("bytes */1000"), header(&decision, "content-range"));
        assert_eq!(None, header(&decision, "content-length"));
    }

    #[test]
    fn test_head_keeps_headers() {
        let decision = plan(RangeOutcome::parse(Some("bytes=0-9"), 1000), &pdf(1000))
            .for_method(&Method::HEAD);

        assert_eq!(StatusCode::PARTIAL_CONTENT, decision.status);
        assert_eq!(BodyPlan::Empty, decision.body);
        assert_eq!(Some("10"), header(&decision, "content-length"));

        let decision = plan(RangeOutcome::NoRange, &pdf(1000)).for_method(&Method::GET);
        assert_eq!(BodyPlan::Full, decision.body);
    }

    #[test]
    fn test_invalid_content_type_falls_back() {
        let resource = pdf(10).with_content_type("bad\nvalue");
        let decision = plan(RangeOutcome::NoRange, &resource);
        assert_eq!(Some(OCTET_STREAM), header(&decision, "content-type"));
    }
}
