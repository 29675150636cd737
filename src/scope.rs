/// Defaults the namespace of a `repository:<name>:<action>` scope.
///
/// Only scopes with exactly three colon-separated parts whose name has no `/`
/// are rewritten; everything else comes back as-is. This is the scope-string
/// twin of [`crate::route::RepositoryPath::with_namespace`] and the two must
/// agree on which images are top-level.
pub fn normalize_scope(scope: &str, default_namespace: &str) -> String {
    let parts: Vec<&str> = scope.split(':').collect();
    if parts.len() != 3 || parts[1].contains('/') {
        return scope.to_string();
    }
    format!(
        "{}:{}/{}:{}",
        parts[0], default_namespace, parts[1], parts[2]
    )
}
