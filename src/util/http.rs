use http::{Method, Request, Version};

/// String representation of HTTP method
pub fn http_method(method: &Method) -> &'static str {
    match *method {
        Method::GET => "GET",
        Method::POST => "POST",
        Method::PUT => "PUT",
        Method::DELETE => "DELETE",
        Method::HEAD => "HEAD",
        Method::OPTIONS => "OPTIONS",
        Method::CONNECT => "CONNECT",
        Method::PATCH => "PATCH",
        Method::TRACE => "TRACE",
        _ => "_OTHER",
    }
}

/// String representation of network protocol version
pub fn http_version(version: Version) -> Option<&'static str> {
    match version {
        Version::HTTP_09 => Some("0.9"),
        Version::HTTP_10 => Some("1.0"),
        Version::HTTP_11 => Some("1.1"),
        Version::HTTP_2 => Some("2"),
        Version::HTTP_3 => Some("3"),
        _ => None,
    }
}

cfg_if::cfg_if! {
    if #[cfg(feature = "axum")] {
        /// The route template the request was matched against, when mounted
        /// inside axum.
        pub fn http_route<B>(req: &Request<B>) -> Option<&str> {
            use axum::extract::MatchedPath;
            req.extensions().get::<MatchedPath>().map(|matched_path| matched_path.as_str())
        }
    } else {
        pub fn http_route<B>(_req: &Request<B>) -> Option<&str> {
            None
        }
    }
}

/// Resolve a traced-attribute name against the request.
///
/// Well-known names map to pieces of the request line; anything else falls
/// back to the equally named request header. Returns `None` when the request
/// has no such attribute.
pub fn request_attribute<B>(req: &Request<B>, name: &str) -> Option<String> {
    match name {
        "method" => Some(http_method(req.method()).to_owned()),
        "path" => Some(req.uri().path().to_owned()),
        "query" => req.uri().query().map(str::to_owned),
        "url" | "uri" => Some(req.uri().to_string()),
        "host" => req
            .uri()
            .host()
            .map(str::to_owned)
            .or_else(|| header_value(req, "host")),
        "scheme" => req
            .uri()
            .scheme_str()
            .map(str::to_owned)
            .or_else(|| forwarded_proto(req)),
        "version" => http_version(req.version()).map(str::to_owned),
        "remote-addr" => header_value(req, "x-forwarded-for").map(|list| {
            match list.split_once(',') {
                Some((first, _)) => first.trim().to_owned(),
                None => list,
            }
        }),
        other => header_value(req, other),
    }
}

fn header_value<B>(req: &Request<B>, name: &str) -> Option<String> {
    req.headers()
        .get(name)
        .and_then(|value| value.to_str().ok())
        .map(str::to_owned)
}

/// Protocol the client used to reach the outermost proxy, per the de-facto
/// standard `X-Forwarded-Proto` header.
fn forwarded_proto<B>(req: &Request<B>) -> Option<String> {
    req.headers()
        .get("x-forwarded-proto")
        .and_then(|value| match value.to_str() {
            Ok(value) if value.eq_ignore_ascii_case("http") => Some("http".to_owned()),
            Ok(value) if value.eq_ignore_ascii_case("https") => Some("https".to_owned()),
            _ => None,
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request() -> Request<()> {
        Request::builder()
            .method(Method::POST)
            .uri("/foo/bar?q=1")
            .header("x-forwarded-proto", "HTTPS")
            .header("x-forwarded-for", "203.0.113.9, 198.51.100.2")
            .header("user-agent", "curl/8")
            .body(())
            .unwrap()
    }

    #[test]
    fn resolves_request_line_attributes() {
        let req = request();
        assert_eq!(request_attribute(&req, "method").as_deref(), Some("POST"));
        assert_eq!(request_attribute(&req, "path").as_deref(), Some("/foo/bar"));
        assert_eq!(request_attribute(&req, "query").as_deref(), Some("q=1"));
        assert_eq!(request_attribute(&req, "scheme").as_deref(), Some("https"));
    }

    #[test]
    fn remote_addr_takes_the_first_forwarded_hop() {
        let req = request();
        assert_eq!(
            request_attribute(&req, "remote-addr").as_deref(),
            Some("203.0.113.9")
        );
    }

    #[test]
    fn unknown_names_fall_back_to_headers() {
        let req = request();
        assert_eq!(
            request_attribute(&req, "user-agent").as_deref(),
            Some("curl/8")
        );
        assert_eq!(request_attribute(&req, "x-missing"), None);
    }
}
