use crate::stats::Weighting;
use anyhow::{Context, Result, anyhow, bail};
use serde::Deserialize;
use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};

/// What a diagnostics run needs to know from its host.
pub trait DiagnosticsHost {
    fn case_names(&self) -> Vec<String>;
    fn case_locations(&self) -> Vec<PathBuf>;
    /// History (raw model output) directory per case, used for land-mask lookup.
    fn case_history_locations(&self) -> Vec<Option<PathBuf>>;
    fn reference_name(&self) -> String;
    fn reference_location(&self) -> PathBuf;
    fn reference_history_location(&self) -> Option<PathBuf>;
    fn is_observation_reference(&self) -> bool;
    fn plot_output_locations(&self) -> Vec<PathBuf>;

    fn image_format(&self) -> String {
        "png".to_string()
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct CaseEntry {
    #[serde(default)]
    pub name: String,
    pub climo_loc: PathBuf,
    #[serde(default)]
    pub hist_loc: Option<PathBuf>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
enum PlotLocation {
    One(PathBuf),
    Many(Vec<PathBuf>),
}

fn default_plot_type() -> String {
    "png".to_string()
}

fn default_weighted() -> bool {
    true
}

/// Configuration file layout.
#[derive(Debug, Clone, Deserialize)]
struct RawConfig {
    cases: Vec<CaseEntry>,
    #[serde(default)]
    baseline: Option<CaseEntry>,
    #[serde(default)]
    compare_obs: bool,
    #[serde(default)]
    obs: Option<CaseEntry>,
    plot_location: PlotLocation,
    #[serde(default = "default_plot_type")]
    plot_type: String,
    #[serde(default = "default_weighted")]
    weighted: bool,
}

/// Validated run configuration with the reference resolved and all paths
/// absolute.
#[derive(Debug, Clone)]
pub struct DiagConfig {
    pub cases: Vec<CaseEntry>,
    pub reference: CaseEntry,
    pub compare_obs: bool,
    pub plot_locations: Vec<PathBuf>,
    pub plot_type: String,
    pub weighted: bool,
}

impl DiagConfig {
    /// Read and validate a configuration file. Relative paths are taken
    /// relative to the file's directory.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let text = fs::read_to_string(path)
            .with_context(|| format!("Failed to read configuration file '{}'", path.display()))?;
        let base = path.parent().unwrap_or_else(|| Path::new("."));
        Self::from_json_str(&text, base)
            .with_context(|| format!("Invalid configuration in '{}'", path.display()))
    }

    pub fn from_json_str(text: &str, base_dir: &Path) -> Result<Self> {
        let raw: RawConfig = serde_json::from_str(text).context("Failed to parse configuration JSON")?;

        let reference = if raw.compare_obs {
            let mut obs = raw
                .obs
                .ok_or_else(|| anyhow!("'compare_obs' is set but no 'obs' entry is configured"))?;
            if obs.name.trim().is_empty() {
                obs.name = "obs".to_string();
            }
            obs
        } else {
            raw.baseline
                .ok_or_else(|| anyhow!("a 'baseline' entry is required unless 'compare_obs' is set"))?
        };

        let plot_locations = match raw.plot_location {
            PlotLocation::One(p) => vec![p],
            PlotLocation::Many(ps) => ps,
        };

        let mut config = DiagConfig {
            cases: raw.cases,
            reference,
            compare_obs: raw.compare_obs,
            plot_locations,
            plot_type: raw.plot_type,
            weighted: raw.weighted,
        };
        config.resolve_paths(base_dir);
        config.validate()?;
        Ok(config)
    }

    fn resolve_paths(&mut self, base: &Path) {
        let resolve = |p: &mut PathBuf| {
            if p.is_relative() {
                *p = base.join(&*p);
            }
        };
        for entry in self.cases.iter_mut().chain(std::iter::once(&mut self.reference)) {
            resolve(&mut entry.climo_loc);
            if let Some(hist) = entry.hist_loc.as_mut() {
                resolve(hist);
            }
        }
        self.plot_locations.iter_mut().for_each(resolve);
    }

    fn validate(&self) -> Result<()> {
        if self.cases.is_empty() {
            bail!("at least one test case is required under 'cases'");
        }

        let mut seen = HashSet::new();
        for case in &self.cases {
            if case.name.trim().is_empty() {
                bail!("every case needs a non-empty 'name'");
            }
            if !seen.insert(case.name.as_str()) {
                bail!("case '{}' is listed more than once", case.name);
            }
        }

        if self.reference.name.trim().is_empty() {
            bail!("the reference needs a non-empty 'name'");
        }
        if seen.contains(self.reference.name.as_str()) {
            bail!(
                "case '{}' is also the reference; a case cannot be compared against itself",
                self.reference.name
            );
        }

        if self.plot_locations.is_empty() {
            bail!("'plot_location' must name at least one directory");
        }
        Ok(())
    }

    pub fn weighting(&self) -> Weighting {
        if self.weighted { Weighting::CosLat } else { Weighting::Uniform }
    }
}

impl DiagnosticsHost for DiagConfig {
    fn case_names(&self) -> Vec<String> {
        self.cases.iter().map(|c| c.name.clone()).collect()
    }

    fn case_locations(&self) -> Vec<PathBuf> {
        self.cases.iter().map(|c| c.climo_loc.clone()).collect()
    }

    fn case_history_locations(&self) -> Vec<Option<PathBuf>> {
        self.cases.iter().map(|c| c.hist_loc.clone()).collect()
    }

    fn reference_name(&self) -> String {
        self.reference.name.clone()
    }

    fn reference_location(&self) -> PathBuf {
        self.reference.climo_loc.clone()
    }

    fn reference_history_location(&self) -> Option<PathBuf> {
        self.reference.hist_loc.clone()
    }

    fn is_observation_reference(&self) -> bool {
        self.compare_obs
    }

    fn plot_output_locations(&self) -> Vec<PathBuf> {
        self.plot_locations.clone()
    }

    fn image_format(&self) -> String {
        self.plot_type.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_config_and_resolve_paths() {
        let json = r#"{
            "cases": [{"name": "c1", "climo_loc": "climo", "hist_loc": "/abs/hist"}],
            "baseline": {"name": "base", "climo_loc": "base_climo"},
            "plot_location": "plots",
            "plot_type": "svg"
        }"#;
        let config = DiagConfig::from_json_str(json, Path::new("/work")).unwrap();

        assert_eq!(config.case_names(), vec!["c1"]);
        assert_eq!(config.case_locations(), vec![PathBuf::from("/work/climo")]);
        assert_eq!(config.case_history_locations(), vec![Some(PathBuf::from("/abs/hist"))]);
        assert_eq!(config.reference_name(), "base");
        assert_eq!(config.reference_location(), PathBuf::from("/work/base_climo"));
        assert_eq!(config.reference_history_location(), None);
        assert!(!config.is_observation_reference());
        assert_eq!(config.plot_output_locations(), vec![PathBuf::from("/work/plots")]);
        assert_eq!(config.image_format(), "svg");
        assert_eq!(config.weighting(), Weighting::CosLat);
    }

    #[test]
    fn test_observation_reference() {
        let json = r#"{
            "cases": [{"name": "c1", "climo_loc": "/c"}],
            "baseline": {"name": "base", "climo_loc": "/b"},
            "compare_obs": true,
            "obs": {"climo_loc": "/obs"},
            "plot_location": ["/p1", "/p2"],
            "weighted": false
        }"#;
        let config = DiagConfig::from_json_str(json, Path::new("/")).unwrap();
        assert!(config.is_observation_reference());
        assert_eq!(config.reference_name(), "obs");
        assert_eq!(config.reference_location(), PathBuf::from("/obs"));
        assert_eq!(config.plot_output_locations().len(), 2);
        assert_eq!(config.image_format(), "png");
        assert_eq!(config.weighting(), Weighting::Uniform);
    }

    #[test]
    fn test_invalid_configs_are_rejected() {
        let no_ref = r#"{"cases": [{"name": "c1", "climo_loc": "/c"}], "plot_location": "/p"}"#;
        assert!(DiagConfig::from_json_str(no_ref, Path::new("/")).is_err());

        let obs_missing = r#"{
            "cases": [{"name": "c1", "climo_loc": "/c"}],
            "baseline": {"name": "b", "climo_loc": "/b"},
            "compare_obs": true,
            "plot_location": "/p"
        }"#;
        assert!(DiagConfig::from_json_str(obs_missing, Path::new("/")).is_err());

        let self_compare = r#"{
            "cases": [{"name": "b", "climo_loc": "/c"}],
            "baseline": {"name": "b", "climo_loc": "/b"},
            "plot_location": "/p"
        }"#;
        assert!(DiagConfig::from_json_str(self_compare, Path::new("/")).is_err());

        let no_cases = r#"{"cases": [], "baseline": {"name": "b", "climo_loc": "/b"}, "plot_location": "/p"}"#;
        assert!(DiagConfig::from_json_str(no_cases, Path::new("/")).is_err());
    }
}
