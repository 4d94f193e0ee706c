use courier_core::{Host, Request};
use url::Url;

use crate::ApiError;

/// Builds the URL for `request`.
///
/// API requests resolve to `{api_base}/v{version}/{action}/{path args...}`;
/// external requests to `{host}{action}/{path args...}`. Query arguments are
/// appended form-encoded in order.
pub fn compose_url(api_base: &str, api_version: u32, request: &Request) -> Result<Url, ApiError> {
    let (mut url, prefix) = match &request.host {
        Host::Api => (
            parse(api_base)?,
            vec![format!("v{api_version}"), request.action.clone()],
        ),
        Host::External(base) => (parse(&format!("{base}{}", request.action))?, Vec::new()),
    };

    {
        let mut segments = url
            .path_segments_mut()
            .map_err(|_| ApiError::InvalidUrl(format!("{api_base} cannot be a base")))?;
        segments.pop_if_empty();
        segments.extend(
            prefix
                .iter()
                .chain(request.path_args.iter())
                .filter(|segment| !segment.is_empty()),
        );
    }

    if !request.query.is_empty() {
        url.query_pairs_mut().extend_pairs(
            request
                .query
                .iter()
                .map(|(key, value)| (key.as_str(), value.as_str())),
        );
    }
    Ok(url)
}

fn parse(raw: &str) -> Result<Url, ApiError> {
    Url::parse(raw).map_err(|err| ApiError::InvalidUrl(format!("{raw}: {err}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn api_request_gets_version_action_and_path() {
        let request = Request::get("coins")
            .path_arg("btc")
            .path_arg("bc1qexample")
            .path_arg("history")
            .query_arg("first_offset", "best")
            .query_arg("limit", 50);

        let url = compose_url("https://api.example.net:30110/", 1, &request).unwrap();
        assert_eq!(
            url.as_str(),
            "https://api.example.net:30110/v1/coins/btc/bc1qexample/history?first_offset=best&limit=50"
        );
    }

    #[test]
    fn api_base_without_trailing_slash() {
        let url = compose_url("http://127.0.0.1:8080", 2, &Request::get("sysinfo")).unwrap();
        assert_eq!(url.as_str(), "http://127.0.0.1:8080/v2/sysinfo");
    }

    #[test]
    fn path_segments_are_escaped() {
        let request = Request::get("coins").path_arg("a b/c");
        let url = compose_url("http://localhost/", 1, &request).unwrap();
        assert_eq!(url.as_str(), "http://localhost/v1/coins/a%20b%2Fc");
    }

    #[test]
    fn external_host_is_used_verbatim() {
        let request = Request::get("recommended").on_host("https://fees.example.org/api/v1/fees/");
        let url = compose_url("https://ignored.example.net/", 1, &request).unwrap();
        assert_eq!(url.as_str(), "https://fees.example.org/api/v1/fees/recommended");
    }

    #[test]
    fn invalid_base_is_reported() {
        let err = compose_url("not a url", 1, &Request::get("sysinfo")).unwrap_err();
        assert!(matches!(err, ApiError::InvalidUrl(_)));
    }
}
