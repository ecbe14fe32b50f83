//! Scenario descriptors and suite construction
//!
//! The built-in suite is an explicit ordered list. A YAML manifest can
//! replace it:
//! ```yaml
//! scenarios:
//!   - name: starts
//!   - name: letter_to_this_server
//!     reference: letter_to_this_server-expected
//! ```

use serde::Deserialize;
use std::path::{Path, PathBuf};

use crate::common::{paths, Config, Error, Result};

/// One named, script-driven test case
#[derive(Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct Scenario {
    /// Scenario name; also the script file name
    pub name: String,
    /// Expected mailbox tree, relative to the scenarios directory
    #[serde(default)]
    pub reference: Option<PathBuf>,
}

impl Scenario {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            reference: None,
        }
    }

    pub fn with_reference(name: &str, reference: &str) -> Self {
        Self {
            name: name.to_string(),
            reference: Some(PathBuf::from(reference)),
        }
    }
}

/// Filesystem locations used by one scenario run
#[derive(Debug, Clone)]
pub struct ScenarioPaths {
    pub script: PathBuf,
    pub log: PathBuf,
    pub mail_dir: PathBuf,
    pub reference: Option<PathBuf>,
}

impl ScenarioPaths {
    pub fn resolve(config: &Config, scenario: &Scenario) -> Self {
        let scenarios_dir = &config.paths.scenarios_dir;
        let work_dir = &config.paths.work_dir;
        Self {
            script: paths::script_path(scenarios_dir, &scenario.name),
            log: paths::log_path(work_dir, &scenario.name),
            mail_dir: paths::mail_dir(work_dir, &scenario.name),
            reference: scenario
                .reference
                .as_ref()
                .map(|r| resolve_relative(scenarios_dir, r)),
        }
    }
}

fn resolve_relative(base: &Path, path: &Path) -> PathBuf {
    if path.is_relative() {
        base.join(path)
    } else {
        path.to_path_buf()
    }
}

/// The standard suite, in execution order
pub fn default_suite() -> Vec<Scenario> {
    vec![
        Scenario::new("starts"),
        Scenario::new("can_quit"),
        Scenario::new("correct_enters"),
        Scenario::with_reference("letter_to_this_server", "letter_to_this_server-expected"),
        Scenario::with_reference("letter_to_other_server", "letter_to_other_server-expected"),
        Scenario::with_reference("two_mails", "two_mails-expected"),
        Scenario::new("unrecognized_command"),
        Scenario::with_reference("rcpt_before_mailto", "letter_to_this_server-expected"),
        Scenario::with_reference("rset_resets", "letter_to_this_server-expected"),
        Scenario::new("vrfy_fails"),
    ]
}

#[derive(Deserialize, Debug)]
struct SuiteManifest {
    scenarios: Vec<Scenario>,
}

/// Load a suite from a YAML manifest
pub fn load_suite(path: &Path) -> Result<Vec<Scenario>> {
    let content = std::fs::read_to_string(path).map_err(|e| {
        Error::SuiteParse(format!("Failed to read '{}': {}", path.display(), e))
    })?;
    parse_suite(&content)
}

/// Parse a YAML suite manifest
pub fn parse_suite(content: &str) -> Result<Vec<Scenario>> {
    let manifest: SuiteManifest =
        serde_yaml::from_str(content).map_err(|e| Error::SuiteParse(e.to_string()))?;

    for scenario in &manifest.scenarios {
        validate_name(&scenario.name)?;
    }
    Ok(manifest.scenarios)
}

/// Scenario names become file names, so they must be a single path component
fn validate_name(name: &str) -> Result<()> {
    let single_component = Path::new(name).components().count() == 1;
    if name.is_empty() || name == "." || name == ".." || !single_component {
        return Err(Error::SuiteParse(format!(
            "Invalid scenario name '{}': must be a plain file name",
            name
        )));
    }
    Ok(())
}
