use crate::constants::{API_ROOT_PATH, ROOT_PATH, TOKEN_PATH};

/// A repository-scoped request path split into its named parts.
///
/// Parsing is purely structural: `/<api_root>/[<namespace>/]<repository>/<operation>/<reference>`.
/// Segments are not validated, so empty segments (from a trailing slash) and
/// roots other than `v2` are carried through untouched.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RepositoryPath {
    pub api_root: String,
    pub namespace: Option<String>,
    pub repository: String,
    pub operation: String,
    pub reference: String,
}

impl RepositoryPath {
    pub fn parse(path: &str) -> Option<Self> {
        let segments: Vec<&str> = path.split('/').collect();
        match segments.as_slice() {
            ["", api_root, repository, operation, reference] => Some(Self {
                api_root: (*api_root).to_string(),
                namespace: None,
                repository: (*repository).to_string(),
                operation: (*operation).to_string(),
                reference: (*reference).to_string(),
            }),
            ["", api_root, namespace, repository, operation, reference] => Some(Self {
                api_root: (*api_root).to_string(),
                namespace: Some((*namespace).to_string()),
                repository: (*repository).to_string(),
                operation: (*operation).to_string(),
                reference: (*reference).to_string(),
            }),
            _ => None,
        }
    }

    pub fn has_namespace(&self) -> bool {
        self.namespace.is_some()
    }

    /// Fills in `namespace` when the path does not carry one.
    pub fn with_namespace(mut self, namespace: &str) -> Self {
        if self.namespace.is_none() {
            self.namespace = Some(namespace.to_string());
        }
        self
    }

    pub fn to_path(&self) -> String {
        let mut segments = vec!["", self.api_root.as_str()];
        if let Some(namespace) = self.namespace.as_deref() {
            segments.push(namespace);
        }
        segments.extend([
            self.repository.as_str(),
            self.operation.as_str(),
            self.reference.as_str(),
        ]);
        segments.join("/")
    }
}

/// How an inbound request is handled, in match priority order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Route {
    Landing,
    Challenge,
    Token,
    NamespaceRedirect(RepositoryPath),
    Proxy,
}

impl Route {
    pub fn classify(path: &str) -> Self {
        match path {
            ROOT_PATH => Self::Landing,
            API_ROOT_PATH => Self::Challenge,
            TOKEN_PATH => Self::Token,
            _ => match RepositoryPath::parse(path) {
                Some(repo) if !repo.has_namespace() => Self::NamespaceRedirect(repo),
                _ => Self::Proxy,
            },
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Landing => "landing",
            Self::Challenge => "challenge",
            Self::Token => "token",
            Self::NamespaceRedirect(_) => "namespace_redirect",
            Self::Proxy => "proxy",
        }
    }
}
