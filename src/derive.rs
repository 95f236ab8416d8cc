use crate::climo::{self, Dataset};
use crate::config::DiagnosticsHost;
use crate::error::{Result, TaylorError};
use crate::field::Field;
use crate::report::Reporter;
use crate::store::ZarrStore;
use crate::vertical::{self, InterpMethod};
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use tracing::debug;

/// Land-fraction threshold at or above which a cell counts as land.
pub const LAND_THRESHOLD: f64 = 0.95;
/// Land-fraction threshold at or below which a cell counts as ocean.
pub const OCEAN_THRESHOLD: f64 = 0.05;

/// Quantities that are computed from stored variables instead of read
/// directly.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DerivedVariable {
    TropicalLandPrecip,
    TropicalOceanPrecip,
    U300,
    ColumnRelativeHumidity,
    ColumnTemperature,
    Land2mTemperature,
    EquatorialPacificStress,
}

impl DerivedVariable {
    pub const ALL: [DerivedVariable; 7] = [
        DerivedVariable::TropicalLandPrecip,
        DerivedVariable::TropicalOceanPrecip,
        DerivedVariable::U300,
        DerivedVariable::ColumnRelativeHumidity,
        DerivedVariable::ColumnTemperature,
        DerivedVariable::Land2mTemperature,
        DerivedVariable::EquatorialPacificStress,
    ];

    pub fn key(self) -> &'static str {
        match self {
            DerivedVariable::TropicalLandPrecip => "TropicalLandPrecip",
            DerivedVariable::TropicalOceanPrecip => "TropicalOceanPrecip",
            DerivedVariable::U300 => "U300",
            DerivedVariable::ColumnRelativeHumidity => "ColumnRelativeHumidity",
            DerivedVariable::ColumnTemperature => "ColumnTemperature",
            DerivedVariable::Land2mTemperature => "Land2mTemperature",
            DerivedVariable::EquatorialPacificStress => "EquatorialPacificStress",
        }
    }

    pub fn is_derived(name: &str) -> bool {
        Self::ALL.iter().any(|d| d.key() == name)
    }
}

impl fmt::Display for DerivedVariable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.key())
    }
}

impl FromStr for DerivedVariable {
    type Err = TaylorError;

    fn from_str(s: &str) -> Result<Self> {
        Self::ALL.into_iter().find(|d| d.key() == s).ok_or_else(|| {
            TaylorError::Unsupported(format!(
                "no derivation for variable '{}'; derived variables are: {}",
                s,
                Self::ALL.map(|d| d.key()).join(", ")
            ))
        })
    }
}

/// Resolves plain and derived variables for a case or the reference.
pub struct Resolver<'a> {
    host: &'a dyn DiagnosticsHost,
    reporter: &'a dyn Reporter,
    interp: InterpMethod,
}

impl<'a> Resolver<'a> {
    pub fn new(host: &'a dyn DiagnosticsHost, reporter: &'a dyn Reporter) -> Self {
        Self {
            host,
            reporter,
            interp: InterpMethod::default(),
        }
    }

    pub fn with_interp_method(mut self, method: InterpMethod) -> Self {
        self.interp = method;
        self
    }

    /// Load `variable` for `casename`, deriving it when it is one of the
    /// derived quantities.
    pub fn retrieve(&self, variable: &str, casename: &str, location: &Path) -> Result<Field> {
        if DerivedVariable::is_derived(variable) {
            self.derive(variable.parse()?, casename, location)
        } else {
            climo::load(casename, location, variable)
        }
    }

    /// Load every variable stored alongside `variable` for `casename`.
    pub fn retrieve_dataset(&self, variable: &str, casename: &str, location: &Path) -> Result<Dataset> {
        climo::load_dataset(casename, location, variable)
    }

    pub fn derive(&self, which: DerivedVariable, casename: &str, location: &Path) -> Result<Field> {
        debug!(variable = %which, case = casename, "deriving");
        let field = match which {
            DerivedVariable::TropicalLandPrecip => {
                let mask = self.land_mask(casename, location)?;
                self.total_precipitation(casename, location)?
                    .masked_where(&mask, |f| f >= LAND_THRESHOLD)?
                    .select_range("lat", -30.0, 30.0)?
            }
            DerivedVariable::TropicalOceanPrecip => {
                let mask = self.land_mask(casename, location)?;
                self.total_precipitation(casename, location)?
                    .masked_where(&mask, |f| f <= OCEAN_THRESHOLD)?
                    .select_range("lat", -30.0, 30.0)?
            }
            DerivedVariable::U300 => self.isobaric(casename, location, "U", 300.0)?,
            DerivedVariable::ColumnRelativeHumidity => self.column_mean(casename, location, "RELHUM")?,
            DerivedVariable::ColumnTemperature => self.column_mean(casename, location, "T")?,
            DerivedVariable::Land2mTemperature => {
                let t = climo::load(casename, location, "TREFHT")?;
                let mask = self.land_mask(casename, location)?;
                t.masked_where(&mask, |f| f >= LAND_THRESHOLD)?
            }
            DerivedVariable::EquatorialPacificStress => {
                climo::load(casename, location, "TAUX")?.select_range("lat", -5.0, 5.0)?
            }
        };
        Ok(field.renamed(which.key()))
    }

    /// PRECT, or PRECC + PRECL when the case has no PRECT climatology.
    pub fn total_precipitation(&self, casename: &str, location: &Path) -> Result<Field> {
        if !climo::find_sources(location, casename, "PRECT")?.is_empty() {
            return climo::load(casename, location, "PRECT");
        }

        self.reporter
            .info(&format!("{}: deriving PRECT = PRECC + PRECL", casename));
        let convective = climo::find_sources(location, casename, "PRECC")?;
        let large_scale = climo::find_sources(location, casename, "PRECL")?;
        if convective.is_empty() || large_scale.is_empty() {
            return Err(TaylorError::NotFound(format!(
                "could not find PRECT, or both PRECC and PRECL, for case '{}' in '{}'",
                casename,
                location.display()
            )));
        }
        if convective.len() > 1 || large_scale.len() > 1 {
            return Err(TaylorError::Unsupported(format!(
                "PRECC/PRECL for case '{}' are split over several sources",
                casename
            )));
        }

        let precc = climo::load(casename, location, "PRECC")?;
        let precl = climo::load(casename, location, "PRECL")?;
        Ok(precc.zip_with(&precl, |c, l| c + l)?.renamed("PRECT"))
    }

    fn isobaric(&self, casename: &str, location: &Path, variable: &str, level_hpa: f64) -> Result<Field> {
        let ds = self.retrieve_dataset(variable, casename, location)?;
        let ps = ds.get("PS")?;
        let p0 = vertical::reference_pressure(ds.get("P0").ok(), ps);
        vertical::interp_to_pressure(
            ds.get(variable)?,
            ps,
            ds.get("hyam")?,
            ds.get("hybm")?,
            p0,
            level_hpa,
            self.interp,
        )
    }

    fn column_mean(&self, casename: &str, location: &Path, variable: &str) -> Result<Field> {
        let ds = self.retrieve_dataset(variable, casename, location)?;
        let ps = ds.get("PS")?;
        let p0 = vertical::reference_pressure(ds.get("P0").ok(), ps);
        vertical::column_average(ds.get(variable)?, ps, ds.get("hyam")?, ds.get("hybm")?, p0)
    }

    /// Land fraction for a case: from its climatology when available,
    /// otherwise from the first history store that carries `LANDFRAC`.
    pub fn land_mask(&self, casename: &str, location: &Path) -> Result<Field> {
        if let Some(first) = climo::find_sources(location, casename, "LANDFRAC")?.first() {
            let store = ZarrStore::new(first)?;
            let metadata = store.load_metadata()?;
            return store.read_field(&metadata, "LANDFRAC");
        }

        let history = self.history_location(casename)?;
        let mut candidates: Vec<PathBuf> = match fs::read_dir(&history) {
            Ok(entries) => entries
                .flatten()
                .filter(|e| e.file_name().to_string_lossy().contains(casename))
                .map(|e| e.path())
                .filter(|p| p.is_dir())
                .collect(),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Vec::new(),
            Err(e) => return Err(TaylorError::io(&history, e)),
        };
        candidates.sort();

        let mut checked = 0;
        for path in &candidates {
            checked += 1;
            let store = ZarrStore::new(path)?;
            let metadata = match store.load_metadata() {
                Ok(m) => m,
                Err(e) => {
                    debug!(store = %path.display(), "skipping unreadable history store: {}", e);
                    continue;
                }
            };
            if metadata.variable("LANDFRAC").is_some() {
                self.reporter.info(&format!(
                    "{}: found LANDFRAC in history store {}",
                    casename,
                    path.display()
                ));
                return store.read_field(&metadata, "LANDFRAC");
            }
        }

        Err(TaylorError::NotFound(format!(
            "checked {} history stores in '{}' but none holds LANDFRAC for case '{}'",
            checked,
            history.display(),
            casename
        )))
    }

    /// History directory of a test case by name, or of the reference.
    fn history_location(&self, casename: &str) -> Result<PathBuf> {
        let location = match self.host.case_names().iter().position(|c| c == casename) {
            Some(i) => self.host.case_history_locations().get(i).cloned().flatten(),
            None => self.host.reference_history_location(),
        };
        location.ok_or_else(|| {
            TaylorError::Precondition(format!(
                "no LANDFRAC climatology for '{}' and no history location configured to search",
                casename
            ))
        })
    }
}
