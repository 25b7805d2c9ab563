//! Header-value extraction for single raw header lines.

/// Return the value of `line` if it starts with `prefix`, compared
/// case-insensitively. `prefix` is the header name including its colon,
/// e.g. `"content-length:"`. Leading spaces and tabs after the colon are
/// skipped; the rest of the line is returned verbatim.
pub fn header_value<'a>(line: &'a str, prefix: &str) -> Option<&'a str> {
    let head = line.get(..prefix.len())?;
    if !head.eq_ignore_ascii_case(prefix) {
        return None;
    }
    Some(line[prefix.len()..].trim_start_matches([' ', '\t']))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn matches_regardless_of_case() {
        for line in ["content-length: 42", "Content-Length: 42", "CONTENT-LENGTH: 42"] {
            assert_eq!(header_value(line, "content-length:"), Some("42"));
        }
    }

    #[test]
    fn value_keeps_inner_spacing_and_case() {
        assert_eq!(
            header_value("Last-Modified: Tue, 15 Nov 1994 08:12:31 GMT", "last-modified:"),
            Some("Tue, 15 Nov 1994 08:12:31 GMT")
        );
    }

    #[test]
    fn missing_space_after_colon_is_accepted() {
        assert_eq!(header_value("Content-Type:binary/octet-stream", "content-type:"), Some("binary/octet-stream"));
    }

    #[test]
    fn other_headers_do_not_match() {
        assert_eq!(header_value("Content-Language: en", "content-length:"), None);
        assert_eq!(header_value("Content", "content-length:"), None);
    }

    #[test]
    fn non_ascii_line_does_not_match() {
        assert_eq!(header_value("Contént-Length: 1", "content-length:"), None);
        assert_eq!(header_value("Cé", "co"), None);
    }

    mod properties {
        use super::*;
        use proptest::prelude::*;

        /// `name` with every ASCII letter's case chosen at random.
        fn any_case(name: &'static str) -> impl Strategy<Value = String> {
            proptest::collection::vec(any::<bool>(), name.len()).prop_map(move |upper| {
                name.chars()
                    .zip(upper)
                    .map(|(c, up)| if up { c.to_ascii_uppercase() } else { c.to_ascii_lowercase() })
                    .collect()
            })
        }

        proptest! {
            #[test]
            fn name_case_never_matters(
                name in prop_oneof![
                    any_case("content-length"),
                    any_case("content-type"),
                    any_case("last-modified"),
                ],
                value in "[!-~]([ -~]{0,40}[!-~])?",
            ) {
                let prefix = format!("{}:", name.to_ascii_lowercase());
                let line = format!("{name}: {value}");
                prop_assert_eq!(header_value(&line, &prefix), Some(value.as_str()));
            }
        }
    }
}
