//! Fixed HTTP status code -> description table used in error payloads.

const STATUS_DESCRIPTIONS: &[(u16, &str)] = &[
    (400, "Bad Request"),
    (401, "Unauthorized"),
    (402, "Payment Required"),
    (403, "Forbidden"),
    (404, "Not Found"),
    (405, "Method Not Allowed"),
    (406, "Not Acceptable"),
    (407, "Proxy Authentication Required"),
    (408, "Request Timeout"),
    (409, "Conflict"),
    (410, "Gone"),
    (411, "Length Required"),
    (412, "Precondition Failed"),
    (413, "Payload Too Large"),
    (414, "URI Too Long"),
    (415, "Unsupported Media Type"),
    (416, "Range Not Satisfiable"),
    (417, "Expectation Failed"),
    (418, "I'm a teapot"),
    (422, "Unprocessable Entity"),
    (425, "Too Early"),
    (426, "Upgrade Required"),
    (428, "Precondition Required"),
    (429, "Too Many Requests"),
    (431, "Request Header Fields Too Large"),
    (451, "Unavailable For Legal Reasons"),
    (500, "Internal Server Error"),
    (501, "Not Implemented"),
    (502, "Bad Gateway"),
    (503, "Service Unavailable"),
    (504, "Gateway Timeout"),
    (505, "HTTP Version Not Supported"),
    (506, "Variant Also Negotiates"),
    (507, "Insufficient Storage"),
    (508, "Loop Detected"),
    (510, "Not Extended"),
    (511, "Network Authentication Required"),
];

/// Description for an error status code, if it is part of the table.
///
/// Only 4xx/5xx codes are listed; success codes are never described.
pub fn describe_status(code: u16) -> Option<&'static str> {
    STATUS_DESCRIPTIONS
        .binary_search_by_key(&code, |(c, _)| *c)
        .ok()
        .map(|idx| STATUS_DESCRIPTIONS[idx].1)
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn known_codes_are_described() {
        assert_eq!(describe_status(400), Some("Bad Request"));
        assert_eq!(describe_status(401), Some("Unauthorized"));
        assert_eq!(describe_status(500), Some("Internal Server Error"));
        assert_eq!(describe_status(511), Some("Network Authentication Required"));
    }

    #[test]
    fn table_is_sorted_for_binary_search() {
        assert!(STATUS_DESCRIPTIONS.windows(2).all(|w| w[0].0 < w[1].0));
    }

    proptest! {
        /// Property: nothing outside the 4xx/5xx range is ever described.
        #[test]
        fn non_error_codes_have_no_description(code in 0u16..400) {
            prop_assert_eq!(describe_status(code), None);
        }
    }
}
