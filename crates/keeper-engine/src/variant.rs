//! Pairing app variants with their test variants, and deciding which to skip.

use keeper_config::manifest::IgnoreSection;
use keeper_config::variants::{AppVariant, TestVariant, VariantModel};

use crate::error::EngineError;

/// What a variant filter gets to look at.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VariantInfo {
    pub name: String,
    pub build_type: String,
    pub flavor: Option<String>,
}

impl From<&AppVariant> for VariantInfo {
    fn from(variant: &AppVariant) -> Self {
        Self {
            name: variant.name.clone(),
            build_type: variant.build_type.clone(),
            flavor: variant.flavor.clone(),
        }
    }
}

/// Decides which app variants Keeper leaves alone.
pub trait VariantFilter {
    fn ignores(&self, variant: &VariantInfo) -> bool;
}

impl<F> VariantFilter for F
where
    F: Fn(&VariantInfo) -> bool,
{
    fn ignores(&self, variant: &VariantInfo) -> bool {
        self(variant)
    }
}

/// Glob-based filter built from the `[ignore]` table.
///
/// A variant is ignored when any pattern matches its name, its build type,
/// or its flavor.
#[derive(Debug, Clone, Default)]
pub struct IgnoreRules {
    variants: Vec<glob::Pattern>,
    build_types: Vec<glob::Pattern>,
    flavors: Vec<glob::Pattern>,
}

impl IgnoreRules {
    /// Compile the patterns of an `[ignore]` table.
    ///
    /// # Errors
    /// Returns `EngineError::IgnorePattern` for a malformed glob.
    pub fn from_section(section: &IgnoreSection) -> Result<Self, EngineError> {
        Ok(Self {
            variants: compile(&section.variants)?,
            build_types: compile(&section.build_types)?,
            flavors: compile(&section.flavors)?,
        })
    }
}

fn compile(patterns: &[String]) -> Result<Vec<glob::Pattern>, EngineError> {
    patterns
        .iter()
        .map(|p| {
            glob::Pattern::new(p).map_err(|e| EngineError::IgnorePattern {
                pattern: p.clone(),
                message: e.to_string(),
            })
        })
        .collect()
}

impl VariantFilter for IgnoreRules {
    fn ignores(&self, variant: &VariantInfo) -> bool {
        let any = |patterns: &[glob::Pattern], value: &str| {
            patterns.iter().any(|p| p.matches(value))
        };
        any(&self.variants, &variant.name)
            || any(&self.build_types, &variant.build_type)
            || variant
                .flavor
                .as_deref()
                .is_some_and(|f| any(&self.flavors, f))
    }
}

/// An app variant bound to the test variant compiled against it.
#[derive(Debug, Clone)]
pub struct VariantPair {
    pub app: AppVariant,
    pub test: TestVariant,
}

impl VariantPair {
    pub fn app_name(&self) -> &str {
        &self.app.name
    }

    pub fn test_name(&self) -> &str {
        &self.test.name
    }
}

/// Select the pairs Keeper processes, in model order.
///
/// App variants without a test variant have no pair. Ignored variants are
/// skipped quietly; non-minified ones are skipped with a warning, since the
/// inferred rules would have nowhere to go.
pub fn select_pairs(model: &VariantModel, filter: &dyn VariantFilter) -> Vec<VariantPair> {
    let mut pairs = Vec::new();
    for app in &model.variants {
        let Some(test) = &app.test else {
            tracing::debug!(variant = %app.name, "no test variant, skipping");
            continue;
        };
        if filter.ignores(&VariantInfo::from(app)) {
            tracing::debug!(variant = %app.name, "ignored by configuration");
            continue;
        }
        if !app.minify_enabled {
            tracing::warn!(
                variant = %app.name,
                "minification is disabled for this variant, skipping keep-rule inference"
            );
            continue;
        }
        pairs.push(VariantPair {
            app: app.clone(),
            test: test.clone(),
        });
    }
    pairs
}

/// Upper-case the first character, as host task names do.
pub fn capitalize(name: &str) -> String {
    let mut chars = name.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn model() -> VariantModel {
        serde_json::from_str(
            r#"{"variants": [
                {"name": "externalRelease", "build_type": "release", "flavor": "external",
                 "minify_enabled": true, "test": {"name": "externalReleaseAndroidTest"}},
                {"name": "internalRelease", "build_type": "release", "flavor": "internal",
                 "minify_enabled": true, "test": {"name": "internalReleaseAndroidTest"}},
                {"name": "externalStaging", "build_type": "staging", "flavor": "external",
                 "minify_enabled": true, "test": {"name": "externalStagingAndroidTest"}},
                {"name": "externalDebug", "build_type": "debug", "flavor": "external",
                 "minify_enabled": false, "test": {"name": "externalDebugAndroidTest"}},
                {"name": "externalBenchmark", "build_type": "benchmark", "flavor": "external",
                 "minify_enabled": true}
            ]}"#,
        )
        .unwrap()
    }

    fn names(pairs: &[VariantPair]) -> Vec<&str> {
        pairs.iter().map(VariantPair::app_name).collect()
    }

    #[test]
    fn keeps_minified_pairs_only() {
        let pairs = select_pairs(&model(), &|_: &VariantInfo| false);
        assert_eq!(
            names(&pairs),
            vec!["externalRelease", "internalRelease", "externalStaging"]
        );
        assert_eq!(
            pairs.first().unwrap().test_name(),
            "externalReleaseAndroidTest"
        );
    }

    #[test]
    fn closure_filter_by_flavor() {
        let filter = |v: &VariantInfo| v.flavor.as_deref() == Some("internal");
        let pairs = select_pairs(&model(), &filter);
        assert_eq!(names(&pairs), vec!["externalRelease", "externalStaging"]);
    }

    #[test]
    fn ignore_rules_from_section() {
        let section = IgnoreSection {
            variants: vec!["*Staging".to_owned()],
            build_types: vec![],
            flavors: vec!["intern?l".to_owned()],
        };
        let rules = IgnoreRules::from_section(&section).unwrap();
        let pairs = select_pairs(&model(), &rules);
        assert_eq!(names(&pairs), vec!["externalRelease"]);
    }

    #[test]
    fn ignore_by_build_type() {
        let section = IgnoreSection {
            build_types: vec!["release".to_owned()],
            ..IgnoreSection::default()
        };
        let rules = IgnoreRules::from_section(&section).unwrap();
        assert_eq!(names(&select_pairs(&model(), &rules)), vec!["externalStaging"]);
    }

    #[test]
    fn empty_rules_ignore_nothing() {
        let rules = IgnoreRules::default();
        assert_eq!(select_pairs(&model(), &rules).len(), 3);
    }

    #[test]
    fn bad_pattern_is_reported() {
        let section = IgnoreSection {
            variants: vec!["[release".to_owned()],
            ..IgnoreSection::default()
        };
        let err = IgnoreRules::from_section(&section).unwrap_err().to_string();
        assert!(err.contains("[release"), "error was: {err}");
    }

    #[test]
    fn capitalize_names() {
        assert_eq!(capitalize("externalRelease"), "ExternalRelease");
        assert_eq!(capitalize("release"), "Release");
        assert_eq!(capitalize(""), "");
    }
}
