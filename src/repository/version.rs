use once_cell::sync::Lazy;
use regex::Regex;

static RELEASE_VERSION: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^v?\d+\.\d+(\.\d+)*(-(dev|patch|alpha|beta|RC)\d*)?$")
        .expect("release version pattern is valid")
});

/// Whether a reference name is a release version (`1.2`, `v1.2.3`, `1.0-RC1`)
pub fn is_release(name: &str) -> bool {
    RELEASE_VERSION.is_match(name)
}

/// Map a branch or tag name to the version string it is published under.
///
/// Release names are kept as is, everything else becomes a
/// development-branch alias (`dev-<name>`).
pub fn classify(name: &str) -> String {
    if is_release(name) {
        name.to_string()
    } else {
        format!("dev-{name}")
    }
}
