//! Kubernetes-compatible name derivation
//!
//! Every object name, image name and helper prefix in a generated chart goes
//! through these functions, so the same project and service keys always map to
//! the same names.

/// Kubernetes object-name length limit (DNS-1123 label)
pub const MAX_NAME_LEN: usize = 63;

/// Normalize a key into a DNS-1123 label
///
/// Lowercases, maps separator characters (`_`, `.`, `/`, whitespace) to `-`,
/// drops anything else outside `[a-z0-9-]`, collapses repeated separators and
/// trims them from both ends. The result is truncated to [`MAX_NAME_LEN`].
///
/// ```
/// use stackchart_core::naming::dns_label;
///
/// assert_eq!(dns_label("Order_Service"), "order-service");
/// assert_eq!(dns_label("__api..gateway__"), "api-gateway");
/// ```
pub fn dns_label(key: &str) -> String {
    let mut label = String::with_capacity(key.len());

    for c in key.chars().flat_map(char::to_lowercase) {
        let mapped = match c {
            'a'..='z' | '0'..='9' => c,
            '-' | '_' | '.' | '/' => '-',
            c if c.is_whitespace() => '-',
            _ => continue,
        };

        if mapped == '-' && (label.is_empty() || label.ends_with('-')) {
            continue;
        }
        label.push(mapped);
    }

    truncate_name(&label, MAX_NAME_LEN)
}

/// Truncate a name to `max` characters and trim any trailing separator
///
/// Mirrors `trunc 63 | trimSuffix "-"` in the emitted helpers.
pub fn truncate_name(name: &str, max: usize) -> String {
    let truncated: String = name.chars().take(max).collect();
    truncated.trim_end_matches('-').to_string()
}

/// Derive the container image name for a service
///
/// A pure function of the project and service keys.
pub fn image_name(project: &str, service: &str) -> String {
    format!("{}-{}", dns_label(project), dns_label(service))
}

/// Full image reference: `registry/imageName(service):version`
pub fn image_reference(registry: &str, project: &str, service: &str, version: &str) -> String {
    format!(
        "{}/{}:{}",
        registry.trim_end_matches('/'),
        image_name(project, service),
        version
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dns_label_lowercases_and_maps_separators() {
        assert_eq!(dns_label("Orders"), "orders");
        assert_eq!(dns_label("order_service"), "order-service");
        assert_eq!(dns_label("order.service"), "order-service");
        assert_eq!(dns_label("Order Service"), "order-service");
    }

    #[test]
    fn test_dns_label_collapses_and_trims() {
        assert_eq!(dns_label("--a__b--"), "a-b");
        assert_eq!(dns_label("a-_-b"), "a-b");
        assert_eq!(dns_label("___"), "");
    }

    #[test]
    fn test_dns_label_drops_invalid_chars() {
        assert_eq!(dns_label("api@v2!"), "apiv2");
    }

    #[test]
    fn test_dns_label_truncates_without_trailing_dash() {
        let key = format!("{}_tail", "a".repeat(62));
        let label = dns_label(&key);
        assert_eq!(label.len(), 62);
        assert!(!label.ends_with('-'));
    }

    #[test]
    fn test_truncate_name() {
        assert_eq!(truncate_name("abc-def", 4), "abc");
        assert_eq!(truncate_name("abc", 63), "abc");
    }

    #[test]
    fn test_image_name_is_stable() {
        assert_eq!(image_name("Shop", "orders"), "shop-orders");
        assert_eq!(image_name("Shop", "orders"), image_name("Shop", "orders"));
        assert_eq!(image_name("my_shop", "Order_API"), "my-shop-order-api");
    }

    #[test]
    fn test_image_reference() {
        assert_eq!(
            image_reference("registry.example.com/", "shop", "orders", "1.2.3"),
            "registry.example.com/shop-orders:1.2.3"
        );
    }
}
