//! Resource quantity parsing and sidecar resource requirements
//!
//! Quantities follow the Kubernetes grammar:
//!
//! ```text
//! <quantity> ::= <signedNumber><suffix>
//! <suffix>   ::= <binarySI> | <decimalExponent> | <decimalSI>
//! <binarySI> ::= Ki | Mi | Gi | Ti | Pi | Ei
//! <decimalSI> ::= n | u | m | "" | k | M | G | T | P | E
//! <decimalExponent> ::= "e" <signedNumber> | "E" <signedNumber>
//! ```
//!
//! Valid input is kept verbatim in the resulting [`Quantity`].

use std::collections::BTreeMap;

use k8s_openapi::api::core::v1::ResourceRequirements;
use k8s_openapi::apimachinery::pkg::api::resource::Quantity;

use crate::{Error, Result};

const FORMAT_WRONG: &str =
    "quantities must match the regular expression '^([+-]?[0-9.]+)([eEinumkKMGTP]*[-+]?[0-9]*)$'";
const BAD_SUFFIX: &str = "unable to parse quantity's suffix";

const BINARY_SI: [&str; 6] = ["Ki", "Mi", "Gi", "Ti", "Pi", "Ei"];
const DECIMAL_SI: [&str; 9] = ["n", "u", "m", "k", "M", "G", "T", "P", "E"];

/// Parse a quantity string such as "100m", "32Mi" or "1e3"
pub fn parse_quantity(input: &str) -> Result<Quantity> {
    let fail = |reason| Error::QuantityParse {
        quantity: input.to_string(),
        reason,
    };

    let (number, suffix) = split_number(input).ok_or_else(|| fail(FORMAT_WRONG))?;
    if !is_valid_number(number) {
        return Err(fail(FORMAT_WRONG));
    }
    if !is_valid_suffix(suffix) {
        return Err(fail(BAD_SUFFIX));
    }

    Ok(Quantity(input.to_string()))
}

/// Split into the signed number and the remaining suffix.
///
/// Returns `None` when the input has no leading number at all.
fn split_number(input: &str) -> Option<(&str, &str)> {
    let unsigned = input.strip_prefix(['+', '-']).unwrap_or(input);
    let sign_len = input.len() - unsigned.len();
    let digits = unsigned
        .find(|c: char| !(c.is_ascii_digit() || c == '.'))
        .unwrap_or(unsigned.len());
    if digits == 0 {
        return None;
    }
    Some(input.split_at(sign_len + digits))
}

fn is_valid_number(number: &str) -> bool {
    let unsigned = number.strip_prefix(['+', '-']).unwrap_or(number);
    let mut parts = unsigned.splitn(2, '.');
    let whole = parts.next().unwrap_or_default();
    let fraction = parts.next();
    match fraction {
        Some(fraction) => {
            !fraction.contains('.') && (!whole.is_empty() || !fraction.is_empty())
        }
        None => !whole.is_empty(),
    }
}

fn is_valid_suffix(suffix: &str) -> bool {
    if suffix.is_empty() || BINARY_SI.contains(&suffix) || DECIMAL_SI.contains(&suffix) {
        return true;
    }
    match suffix.strip_prefix(['e', 'E']) {
        Some(exponent) => {
            let digits = exponent.strip_prefix(['+', '-']).unwrap_or(exponent);
            !digits.is_empty() && digits.chars().all(|c| c.is_ascii_digit())
        }
        None => false,
    }
}

/// Build resource requirements from up to four optional quantities
///
/// Empty strings count as absent. `requests` and `limits` are only populated
/// when at least one of their fields is set.
pub fn sidecar_resources(
    cpu_request: Option<&str>,
    memory_request: Option<&str>,
    cpu_limit: Option<&str>,
    memory_limit: Option<&str>,
) -> Result<ResourceRequirements> {
    Ok(ResourceRequirements {
        requests: resource_list(cpu_request, memory_request)?,
        limits: resource_list(cpu_limit, memory_limit)?,
        ..Default::default()
    })
}

fn resource_list(
    cpu: Option<&str>,
    memory: Option<&str>,
) -> Result<Option<BTreeMap<String, Quantity>>> {
    let mut list = BTreeMap::new();
    if let Some(cpu) = cpu.filter(|v| !v.is_empty()) {
        list.insert("cpu".to_string(), parse_quantity(cpu)?);
    }
    if let Some(memory) = memory.filter(|v| !v.is_empty()) {
        list.insert("memory".to_string(), parse_quantity(memory)?);
    }
    Ok((!list.is_empty()).then_some(list))
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case::millicores("100m")]
    #[case::whole("1")]
    #[case::fraction("0.5")]
    #[case::leading_dot(".5")]
    #[case::binary("32Mi")]
    #[case::decimal("1G")]
    #[case::exponent("1e3")]
    #[case::signed_exponent("12E-3")]
    #[case::signed("+10")]
    fn test_valid_quantities(#[case] input: &str) {
        let q = parse_quantity(input).expect("quantity should parse");
        assert_eq!(q.0, input);
    }

    #[rstest]
    #[case::empty("", FORMAT_WRONG)]
    #[case::letters("abc", FORMAT_WRONG)]
    #[case::lonely_dot(".", FORMAT_WRONG)]
    #[case::two_dots("1.2.3", FORMAT_WRONG)]
    #[case::bad_suffix("10Xi", BAD_SUFFIX)]
    #[case::lowercase_ki("10ki", BAD_SUFFIX)]
    #[case::empty_exponent("1e", BAD_SUFFIX)]
    fn test_invalid_quantities(#[case] input: &str, #[case] reason: &str) {
        let err = parse_quantity(input).unwrap_err();
        match err {
            Error::QuantityParse {
                quantity,
                reason: got,
            } => {
                assert_eq!(quantity, input);
                assert_eq!(got, reason);
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_sidecar_resources_requests_only() {
        let res = sidecar_resources(Some("10m"), Some("32Mi"), None, None)
            .expect("requests should build");
        let requests = res.requests.expect("requests should be set");
        assert_eq!(requests["cpu"], Quantity("10m".to_string()));
        assert_eq!(requests["memory"], Quantity("32Mi".to_string()));
        assert!(res.limits.is_none());
    }

    #[test]
    fn test_sidecar_resources_partial_limits() {
        let res = sidecar_resources(None, None, None, Some("64Mi")).expect("limits should build");
        assert!(res.requests.is_none());
        let limits = res.limits.expect("limits should be set");
        assert_eq!(limits.len(), 1);
        assert_eq!(limits["memory"], Quantity("64Mi".to_string()));
    }

    #[test]
    fn test_sidecar_resources_empty_strings_are_absent() {
        let res = sidecar_resources(Some(""), Some(""), Some(""), Some("")).expect("should build");
        assert_eq!(res, ResourceRequirements::default());
    }

    #[test]
    fn test_sidecar_resources_propagates_field_error() {
        let err = sidecar_resources(Some("10m"), Some("lots"), None, None).unwrap_err();
        assert!(err.to_string().contains("\"lots\""));
    }
}
