//! Alternatives declared by packages under `etc/lpkg.d/alt.d/`.
//!
//! ```text
//! etc/lpkg.d/alt.d/editor/.target          contents: /usr/bin/editor
//! etc/lpkg.d/alt.d/editor/vim.provider     shipped by vim
//! etc/lpkg.d/alt.d/editor/nano.provider    shipped by nano
//! ```
//!
//! After merging, `/usr/bin/editor` becomes a symlink to the first provider
//! in lexicographic order, here `/etc/lpkg.d/alt.d/editor/nano.provider`.
//! Providers are typically themselves symlinks to the real program.

use std::collections::{BTreeMap, BTreeSet};

/// Directory (relative to the filesystem root) holding alternative declarations.
pub const ALTERNATIVES_DIR: &str = "etc/lpkg.d/alt.d";

/// File whose contents name the path an alternative is installed at.
pub const TARGET_FILE: &str = ".target";

/// Suffix of provider declarations.
pub const PROVIDER_SUFFIX: &str = ".provider";

/// What an archive path means to the resolver.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AltPath<'p> {
    Target { alternative: &'p str },
    Provider { alternative: &'p str, provider: &'p str },
    Other,
}

/// Classify an archive member path. Leading `./` and `/` are ignored, and
/// only files directly inside `alt.d/<name>/` count.
pub fn classify(path: &str) -> AltPath<'_> {
    let path = path.trim_start_matches("./").trim_start_matches('/');
    let Some(rest) = path
        .strip_prefix(ALTERNATIVES_DIR)
        .and_then(|rest| rest.strip_prefix('/'))
    else {
        return AltPath::Other;
    };
    let Some((alternative, file)) = rest.split_once('/') else {
        return AltPath::Other;
    };
    if alternative.is_empty() || file.is_empty() || file.contains('/') {
        return AltPath::Other;
    }
    if file == TARGET_FILE {
        AltPath::Target { alternative }
    } else if file.ends_with(PROVIDER_SUFFIX) {
        AltPath::Provider {
            alternative,
            provider: file,
        }
    } else {
        AltPath::Other
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
struct Alternative {
    target: Option<String>,
    providers: BTreeSet<String>,
}

/// A resolved alternative, ready to become a symlink.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedAlternative {
    pub name: String,
    /// Path the symlink is archived at, exactly as the `.target` file names it.
    pub link_path: String,
    /// Selected provider file name.
    pub provider: String,
    /// Absolute path the symlink points at.
    pub link_target: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Resolution {
    pub resolved: Vec<ResolvedAlternative>,
    /// Alternatives that declared a target but have no provider.
    pub unresolved: Vec<String>,
}

/// Targets and providers collected while streaming archives.
#[derive(Debug, Clone, Default)]
pub struct AlternativesTable {
    entries: BTreeMap<String, Alternative>,
}

impl AlternativesTable {
    /// Record a target. The last archive to declare one wins.
    pub fn set_target(&mut self, alternative: &str, target: &str) {
        let entry = self.entries.entry(alternative.to_string()).or_default();
        if let Some(previous) = entry.target.replace(target.to_string()) {
            if previous != target {
                log::debug!("alternative {alternative}: target {previous} replaced by {target}");
            }
        }
    }

    pub fn add_provider(&mut self, alternative: &str, provider: &str) {
        self.entries
            .entry(alternative.to_string())
            .or_default()
            .providers
            .insert(provider.to_string());
    }

    /// Pick a provider for every alternative that has a target, in name order.
    pub fn resolve(self) -> Resolution {
        let mut resolution = Resolution::default();
        for (name, alternative) in self.entries {
            let Some(target) = alternative.target else {
                continue;
            };
            match alternative.providers.into_iter().next() {
                Some(provider) => resolution.resolved.push(ResolvedAlternative {
                    link_target: format!("/{ALTERNATIVES_DIR}/{name}/{provider}"),
                    name,
                    link_path: target,
                    provider,
                }),
                None => resolution.unresolved.push(name),
            }
        }
        resolution
    }
}
