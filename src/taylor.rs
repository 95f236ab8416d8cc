use crate::config::DiagnosticsHost;
use crate::derive::Resolver;
use crate::diagram::{CaseSeries, Diagram, case_color};
use crate::error::{Result, TaylorError};
use crate::field::Field;
use crate::render::{self, ImageFormat};
use crate::report::Reporter;
use crate::season::Season;
use crate::stats::{self, TaylorStats, Weighting};
use crate::vertical::InterpMethod;
use serde_json::Value;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Variables on every diagram, in annotation order.
pub const VARIABLES: [&str; 10] = [
    "PSL",
    "SWCF",
    "LWCF",
    "TropicalLandPrecip",
    "TropicalOceanPrecip",
    "Land2mTemperature",
    "EquatorialPacificStress",
    "U300",
    "ColumnRelativeHumidity",
    "ColumnTemperature",
];

/// Statistics of one case for one season, one row per variable.
#[derive(Debug, Clone)]
pub struct StatsTable {
    case: String,
    rows: Vec<(String, Option<TaylorStats>)>,
}

impl StatsTable {
    pub fn new(case: &str, variables: &[String]) -> Self {
        Self {
            case: case.to_string(),
            rows: variables.iter().map(|v| (v.clone(), None)).collect(),
        }
    }

    pub fn case(&self) -> &str {
        &self.case
    }

    pub fn rows(&self) -> &[(String, Option<TaylorStats>)] {
        &self.rows
    }

    pub fn get(&self, variable: &str) -> Option<&TaylorStats> {
        self.rows
            .iter()
            .find(|(v, _)| v == variable)
            .and_then(|(_, s)| s.as_ref())
    }

    fn set(&mut self, variable: &str, stats: TaylorStats) {
        if let Some(row) = self.rows.iter_mut().find(|(v, _)| v == variable) {
            row.1 = Some(stats);
        }
    }
}

/// All case tables of one season.
#[derive(Debug, Clone)]
pub struct SeasonResults {
    pub season: Season,
    pub variables: Vec<String>,
    pub tables: Vec<StatsTable>,
}

impl SeasonResults {
    pub fn table(&self, case: &str) -> Option<&StatsTable> {
        self.tables.iter().find(|t| t.case == case)
    }

    pub fn diagram(&self) -> Diagram {
        Diagram {
            title: self.season.label().to_string(),
            variables: self.variables.clone(),
            cases: self
                .tables
                .iter()
                .enumerate()
                .map(|(i, table)| CaseSeries {
                    name: table.case.clone(),
                    color: case_color(i),
                    stats: table.rows.iter().map(|(_, s)| *s).collect(),
                })
                .collect(),
        }
    }

    /// Plain-text table per case, as printed by the `stats` command.
    pub fn format_tables(&self) -> String {
        let mut out = String::new();
        for table in &self.tables {
            out.push_str(&format!("{} {}\n", self.season, table.case));
            out.push_str(&format!(
                "  {:<26} {:>12} {:>12} {:>12}\n",
                "variable", "corr", "ratio", "bias (%)"
            ));
            for (variable, stats) in &table.rows {
                match stats {
                    Some(s) => out.push_str(&format!(
                        "  {:<26} {:>12.4} {:>12.4} {:>12.2}\n",
                        variable, s.correlation, s.ratio, s.bias_percent
                    )),
                    None => out.push_str(&format!("  {:<26} {:>12} {:>12} {:>12}\n", variable, "-", "-", "-")),
                }
            }
        }
        out
    }
}

/// JSON view of computed results, keyed by season then case then variable.
pub fn results_json(results: &[SeasonResults]) -> serde_json::Result<Value> {
    let mut seasons = serde_json::Map::new();
    for result in results {
        let mut cases = serde_json::Map::new();
        for table in &result.tables {
            let mut rows = serde_json::Map::new();
            for (variable, stats) in &table.rows {
                rows.insert(variable.clone(), serde_json::to_value(stats)?);
            }
            cases.insert(table.case.clone(), Value::Object(rows));
        }
        seasons.insert(result.season.label().to_string(), Value::Object(cases));
    }
    Ok(Value::Object(seasons))
}

#[derive(Debug, Clone)]
pub struct RunOptions {
    pub seasons: Vec<Season>,
    pub variables: Vec<String>,
    pub weighting: Weighting,
    pub interp: InterpMethod,
}

impl Default for RunOptions {
    fn default() -> Self {
        Self {
            seasons: Season::ALL.to_vec(),
            variables: VARIABLES.iter().map(|v| v.to_string()).collect(),
            weighting: Weighting::CosLat,
            interp: InterpMethod::Linear,
        }
    }
}

/// A diagram written to disk.
#[derive(Debug, Clone)]
pub struct RenderedDiagram {
    pub season: Season,
    pub path: PathBuf,
    pub results: SeasonResults,
}

/// Taylor diagram diagnostics for the cases and reference of a host.
pub struct TaylorRun<'a> {
    host: &'a dyn DiagnosticsHost,
    reporter: &'a dyn Reporter,
    options: RunOptions,
}

impl<'a> TaylorRun<'a> {
    pub fn new(host: &'a dyn DiagnosticsHost, reporter: &'a dyn Reporter, options: RunOptions) -> Self {
        Self { host, reporter, options }
    }

    fn resolver(&self) -> Resolver<'a> {
        Resolver::new(self.host, self.reporter).with_interp_method(self.options.interp)
    }

    /// Statistics of every case for every selected season.
    pub fn compute(&self) -> Result<Vec<SeasonResults>> {
        self.options
            .seasons
            .iter()
            .map(|&season| self.compute_season(season))
            .collect()
    }

    /// Statistics of every case for one season.
    pub fn compute_season(&self, season: Season) -> Result<SeasonResults> {
        let resolver = self.resolver();
        let case_names = self.host.case_names();
        let case_locations = self.host.case_locations();
        if case_names.len() != case_locations.len() {
            return Err(TaylorError::Precondition(format!(
                "{} case names but {} climatology locations",
                case_names.len(),
                case_locations.len()
            )));
        }
        let reference_name = self.host.reference_name();
        let reference_location = self.host.reference_location();

        let mut tables: Vec<StatsTable> = case_names
            .iter()
            .map(|c| StatsTable::new(c, &self.options.variables))
            .collect();

        for variable in &self.options.variables {
            let reference = match resolver.retrieve(variable, &reference_name, &reference_location) {
                Ok(field) => field.season_mean(season)?,
                Err(e) if e.is_not_found() => {
                    self.reporter.warn(&format!(
                        "{} {}: reference '{}' unavailable, skipping for all cases ({})",
                        season, variable, reference_name, e
                    ));
                    continue;
                }
                Err(e) => return Err(e),
            };

            for (table, location) in tables.iter_mut().zip(&case_locations) {
                let case = match resolver.retrieve(variable, &table.case, location) {
                    Ok(field) => field.season_mean(season)?,
                    Err(e) if e.is_not_found() => {
                        self.reporter.warn(&format!(
                            "{} {}: skipping case '{}' ({})",
                            season, variable, table.case, e
                        ));
                        continue;
                    }
                    Err(e) => return Err(e),
                };

                let stats = self.compare(&case, &reference)?;
                debug!(
                    season = %season,
                    variable = %variable,
                    case = %table.case,
                    corr = stats.correlation,
                    ratio = stats.ratio,
                    bias = stats.bias_percent,
                    "computed statistics"
                );
                if !stats.is_finite() {
                    self.reporter.warn(&format!(
                        "{} {}: case '{}' has non-finite statistics (corr={}, ratio={}, bias={}); it will not be drawn",
                        season, variable, table.case, stats.correlation, stats.ratio, stats.bias_percent
                    ));
                }
                table.set(variable, stats);
            }
        }

        Ok(SeasonResults {
            season,
            variables: self.options.variables.clone(),
            tables,
        })
    }

    fn compare(&self, case: &Field, reference: &Field) -> Result<TaylorStats> {
        stats::taylor_stats(case, reference, self.options.weighting)
    }

    /// Compute and draw one diagram per selected season.
    pub fn run(&self) -> Result<Vec<RenderedDiagram>> {
        let format: ImageFormat = self.host.image_format().parse()?;
        let output_dir = prepare_output_dir(self.host, self.reporter)?;
        if self.host.is_observation_reference() {
            self.reporter.info(&format!(
                "Comparing against observations '{}'",
                self.host.reference_name()
            ));
        }

        let mut rendered = Vec::with_capacity(self.options.seasons.len());
        for &season in &self.options.seasons {
            let results = self.compute_season(season)?;
            let path = output_path(&output_dir, season, format);
            self.render(&results, &path, format)?;
            self.reporter.info(&format!(
                "Taylor Diagram: completed {}. File: {}",
                season,
                path.display()
            ));
            rendered.push(RenderedDiagram { season, path, results });
        }
        Ok(rendered)
    }

    /// Draw finished season results to `path`.
    pub fn render(&self, results: &SeasonResults, path: &Path, format: ImageFormat) -> Result<()> {
        let skipped = render::render_to_file(&results.diagram(), path, format)?;
        for point in skipped.iter().filter(|p| !p.non_finite) {
            self.reporter.warn(&format!(
                "{} {}: case '{}' not drawn, {}",
                results.season, point.variable, point.case, point.reason
            ));
        }
        Ok(())
    }
}

/// `{dir}/amwg_taylor_diagram_{SEASON}.{ext}`
pub fn output_path(dir: &Path, season: Season, format: ImageFormat) -> PathBuf {
    dir.join(format!("amwg_taylor_diagram_{}.{}", season, format.extension()))
}

/// Create every configured output directory and return the one diagrams go
/// to (the first).
pub fn prepare_output_dir(host: &dyn DiagnosticsHost, reporter: &dyn Reporter) -> Result<PathBuf> {
    let locations = host.plot_output_locations();
    let Some(first) = locations.first().cloned() else {
        return Err(TaylorError::Precondition("no plot output location configured".to_string()));
    };

    for dir in &locations {
        if !dir.is_dir() {
            reporter.info(&format!("{} not found, making new directory", dir.display()));
            fs::create_dir_all(dir).map_err(|e| TaylorError::io(dir, e))?;
        }
    }

    if locations.len() > 1 {
        reporter.warn(&format!(
            "Ambiguous plotting location since all cases go on the same plot; using the first: {}",
            first.display()
        ));
    }
    Ok(first)
}
