//! Free-text query formatting for profile addresses

use crate::models::AddressFields;

const SEPARATOR: &str = ", ";

/// Join the non-empty address fields into one geocoding query
///
/// Order is street address, city, province, country. Missing and
/// whitespace-only fields are dropped, so there are never leading, trailing
/// or doubled separators. All-empty input yields `""`. Trimming covers
/// ASCII whitespace only, matching the candidate query's blank test.
pub fn format_address(fields: &AddressFields) -> String {
    [
        fields.address.as_deref(),
        fields.city.as_deref(),
        fields.province.as_deref(),
        fields.country.as_deref(),
    ]
    .into_iter()
    .flatten()
    .map(|part| part.trim_matches(|c: char| c.is_ascii_whitespace()))
    .filter(|part| !part.is_empty())
    .collect::<Vec<_>>()
    .join(SEPARATOR)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fields(
        address: Option<&str>,
        city: Option<&str>,
        province: Option<&str>,
        country: Option<&str>,
    ) -> AddressFields {
        AddressFields {
            user_id: "u1".to_string(),
            address: address.map(str::to_string),
            city: city.map(str::to_string),
            province: province.map(str::to_string),
            country: country.map(str::to_string),
        }
    }

    #[test]
    fn test_all_fields() {
        let f = fields(Some("12 King St"), Some("Toronto"), Some("ON"), Some("Canada"));
        assert_eq!(format_address(&f), "12 King St, Toronto, ON, Canada");
    }

    #[test]
    fn test_all_empty() {
        assert_eq!(format_address(&fields(None, None, None, None)), "");
        assert_eq!(format_address(&fields(Some(""), Some("  "), None, Some("\t"))), "");
    }

    #[test]
    fn test_subset_keeps_order_without_stray_separators() {
        let f = fields(Some("12 King St"), None, Some(""), Some("Canada"));
        assert_eq!(format_address(&f), "12 King St, Canada");

        let f = fields(None, Some("Toronto"), None, None);
        assert_eq!(format_address(&f), "Toronto");
    }

    #[test]
    fn test_fields_are_trimmed() {
        let f = fields(Some("  12 King St "), Some(" Toronto"), None, None);
        assert_eq!(format_address(&f), "12 King St, Toronto");
    }

    #[test]
    fn test_control_whitespace_field_is_blank() {
        let f = fields(Some("\t\r\n"), Some("\x0CToronto\n"), None, None);
        assert_eq!(format_address(&f), "Toronto");
    }
}
