//! Case-insensitive path keyword filters

/// Split a user supplied list on ASCII or full-width commas, trimming blanks
pub fn split_list(raw: &str) -> Vec<String> {
    raw.split([',', '，'])
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

/// Include/exclude filter over media paths.
///
/// An empty include list accepts everything; any exclude hit rejects.
#[derive(Debug, Clone, Default)]
pub struct KeywordFilter {
    include: Vec<String>,
    exclude: Vec<String>,
}

impl KeywordFilter {
    pub fn new<I, E>(include: I, exclude: E) -> Self
    where
        I: IntoIterator,
        I::Item: AsRef<str>,
        E: IntoIterator,
        E::Item: AsRef<str>,
    {
        let normalize = |k: &str| {
            let k = k.trim().to_lowercase();
            (!k.is_empty()).then_some(k)
        };
        Self {
            include: include.into_iter().filter_map(|k| normalize(k.as_ref())).collect(),
            exclude: exclude.into_iter().filter_map(|k| normalize(k.as_ref())).collect(),
        }
    }

    pub fn is_included(&self, path: &str) -> bool {
        let path = path.to_lowercase();
        self.include.is_empty() || self.include.iter().any(|k| path.contains(k.as_str()))
    }

    pub fn is_excluded(&self, path: &str) -> bool {
        let path = path.to_lowercase();
        self.exclude.iter().any(|k| path.contains(k.as_str()))
    }

    pub fn matches(&self, path: &str) -> bool {
        self.is_included(path) && !self.is_excluded(path)
    }
}
