//! Which imports stay unbundled.

use buildmate_config::PackageJson;

use crate::Result;
use crate::options::NormalizedOptions;

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ExternalSet {
    /// Package names; `name` and any `name/...` subpath are external.
    pub packages: Vec<String>,
    /// Explicit patterns, `*` matches any run of characters.
    pub patterns: Vec<String>,
    /// Always bundled, even when another rule says otherwise.
    pub no_external: Vec<String>,
    /// Externalize every bare import.
    pub skip_node_modules: bool,
    /// Compiler path-alias patterns; aliased imports are local code.
    pub aliases: Vec<String>,
}

impl ExternalSet {
    /// Production dependencies of the project, plus `external` entries.
    ///
    /// An `external` entry naming a `package.json` file is replaced by that
    /// package's own production dependencies.
    pub fn for_project(options: &NormalizedOptions, pkg: &PackageJson) -> Result<Self> {
        let mut packages = pkg.production_deps();
        let mut patterns = Vec::new();

        for entry in &options.external {
            if entry.ends_with("package.json") {
                let manifest = PackageJson::from_path(&options.cwd.join(entry))?;
                packages.extend(manifest.production_deps());
            } else {
                patterns.push(entry.clone());
            }
        }
        packages.sort();
        packages.dedup();

        Ok(Self {
            packages,
            patterns,
            no_external: options.no_external.clone(),
            skip_node_modules: options.skip_node_modules_bundle,
            aliases: options.tsconfig_resolve_paths.keys().cloned().collect(),
        })
    }

    pub fn is_external(&self, specifier: &str) -> bool {
        if self
            .no_external
            .iter()
            .any(|pattern| package_or_pattern_matches(pattern, specifier))
        {
            return false;
        }

        if self.skip_node_modules
            && is_bare(specifier)
            && !self.aliases.iter().any(|alias| wildcard_match(alias, specifier))
        {
            return true;
        }

        self.packages
            .iter()
            .any(|name| is_package_or_subpath(name, specifier))
            || self
                .patterns
                .iter()
                .any(|pattern| package_or_pattern_matches(pattern, specifier))
    }

    /// Patterns in the form bundlers accept on the command line.
    pub fn bundler_patterns(&self) -> Vec<String> {
        let mut out = Vec::with_capacity(self.packages.len() * 2 + self.patterns.len());
        for name in &self.packages {
            if self.no_external.contains(name) {
                continue;
            }
            out.push(name.clone());
            out.push(format!("{name}/*"));
        }
        out.extend(self.patterns.iter().cloned());
        out
    }
}

/// Relative, absolute, or drive-letter paths are not package imports.
pub fn is_bare(specifier: &str) -> bool {
    let bytes = specifier.as_bytes();
    let drive_letter = bytes.len() >= 3
        && bytes[0].is_ascii_uppercase()
        && bytes[1] == b':'
        && (bytes[2] == b'/' || bytes[2] == b'\\');
    let relative = specifier.starts_with("./")
        || specifier.starts_with("../")
        || specifier.starts_with('/')
        || specifier == "."
        || specifier == "..";
    !(drive_letter || relative)
}

fn is_package_or_subpath(name: &str, specifier: &str) -> bool {
    specifier == name
        || specifier
            .strip_prefix(name)
            .is_some_and(|rest| rest.starts_with('/') || rest.starts_with('\\'))
}

fn package_or_pattern_matches(pattern: &str, specifier: &str) -> bool {
    if pattern.contains('*') {
        wildcard_match(pattern, specifier)
    } else {
        is_package_or_subpath(pattern, specifier)
    }
}

/// `*` matches any (possibly empty) run of characters.
pub fn wildcard_match(pattern: &str, text: &str) -> bool {
    let parts: Vec<&str> = pattern.split('*').collect();
    if parts.len() == 1 {
        return pattern == text;
    }

    let (first, last) = (parts[0], parts[parts.len() - 1]);
    if !text.starts_with(first) || text.len() < first.len() + last.len() || !text.ends_with(last) {
        return false;
    }

    let mut rest = &text[first.len()..text.len() - last.len()];
    for middle in &parts[1..parts.len() - 1] {
        match rest.find(middle) {
            Some(idx) => rest = &rest[idx + middle.len()..],
            None => return false,
        }
    }
    true
}

/// Package name for a bare specifier (`@scope/pkg/sub` -> `@scope/pkg`).
pub fn package_name(specifier: &str) -> &str {
    let mut slashes = specifier.match_indices('/');
    let cut = if specifier.starts_with('@') {
        slashes.nth(1)
    } else {
        slashes.next()
    };
    match cut {
        Some((idx, _)) => &specifier[..idx],
        None => specifier,
    }
}
