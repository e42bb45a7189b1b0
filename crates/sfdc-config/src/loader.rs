//! Configuration loader
//!
//! Reads the YAML document, expands query file references and validates
//! every instance. Query files are resolved relative to the file that
//! names them and may include further files; a file that re-enters its own
//! include chain is rejected.

use crate::error::{ConfigError, ConfigResult};
use crate::instance::InstanceConfig;
use crate::model::{QueryEntry, QueryFile, RawConfig};
use sfdc_query::QueryTemplate;
use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};

/// Loads and validates configuration documents
#[derive(Debug, Default)]
pub struct ConfigLoader {
    include_stack: Vec<PathBuf>,
}

impl ConfigLoader {
    /// Create a new loader
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Load configuration from a file
    ///
    /// # Arguments
    /// * `path` - Path to the YAML configuration
    ///
    /// # Errors
    /// Returns `ConfigError` if the file or any included query file cannot
    /// be read or parsed, or if validation fails
    pub fn load(&mut self, path: impl AsRef<Path>) -> ConfigResult<Vec<InstanceConfig>> {
        let path = path.as_ref();
        tracing::info!(path = %path.display(), "loading configuration");
        let content = fs::read_to_string(path).map_err(|e| ConfigError::io_error(path, e))?;
        let raw: RawConfig =
            serde_yaml::from_str(&content).map_err(|e| ConfigError::yaml_error(path, e))?;
        self.build(raw, base_dir(path))
    }

    /// Load configuration from YAML text
    ///
    /// # Arguments
    /// * `yaml` - Configuration document
    /// * `base_dir` - Directory query file references are resolved against
    ///
    /// # Errors
    /// Returns `ConfigError` if the document or an included file is invalid
    pub fn parse(
        &mut self,
        yaml: &str,
        base_dir: impl AsRef<Path>,
    ) -> ConfigResult<Vec<InstanceConfig>> {
        let raw: RawConfig =
            serde_yaml::from_str(yaml).map_err(|e| ConfigError::yaml_error("<inline>", e))?;
        self.build(raw, base_dir.as_ref())
    }

    fn build(&mut self, raw: RawConfig, base: &Path) -> ConfigResult<Vec<InstanceConfig>> {
        if raw.instances.is_empty() {
            return Err(ConfigError::NoInstances);
        }

        let shared = self.expand(raw.queries, base)?;
        let mut names = HashSet::new();
        let mut instances = Vec::with_capacity(raw.instances.len());

        for instance in raw.instances {
            if !names.insert(instance.name.clone()) {
                return Err(ConfigError::DuplicateInstance(instance.name));
            }
            let mut queries = shared.clone();
            queries.extend(self.expand(instance.queries, base)?);

            let config = InstanceConfig::validate(&instance.name, &instance.arguments, queries)?;
            tracing::info!(
                instance = config.name(),
                queries = config.queries.len(),
                interval = %config.defaults.generation_interval,
                lag_minutes = config.defaults.time_lag_minutes,
                "instance configured"
            );
            instances.push(config);
        }

        Ok(instances)
    }

    fn expand(&mut self, entries: Vec<QueryEntry>, base: &Path) -> ConfigResult<Vec<QueryTemplate>> {
        let mut templates = Vec::with_capacity(entries.len());
        for entry in entries {
            if let Some(include) = entry.include_path() {
                let included = base.join(include);
                templates.extend(self.include(&included)?);
                continue;
            }
            match entry {
                QueryEntry::Template(template) => templates.push(template),
                QueryEntry::Text(text) => templates.push(QueryTemplate::new(text)),
            }
        }
        Ok(templates)
    }

    fn include(&mut self, path: &Path) -> ConfigResult<Vec<QueryTemplate>> {
        let canonical = fs::canonicalize(path).map_err(|e| ConfigError::io_error(path, e))?;
        if self.include_stack.contains(&canonical) {
            let mut chain = self.include_stack.clone();
            chain.push(canonical);
            return Err(ConfigError::IncludeCycle { chain });
        }

        tracing::debug!(path = %canonical.display(), "including query file");
        let content =
            fs::read_to_string(&canonical).map_err(|e| ConfigError::io_error(&canonical, e))?;
        let file: QueryFile =
            serde_yaml::from_str(&content).map_err(|e| ConfigError::yaml_error(&canonical, e))?;

        self.include_stack.push(canonical.clone());
        let expanded = self.expand(file.into_entries(), base_dir(&canonical));
        self.include_stack.pop();
        expanded
    }
}

fn base_dir(path: &Path) -> &Path {
    path.parent().unwrap_or_else(|| Path::new("."))
}

#[cfg(test)]
mod tests {
    use super::*;

    const MINIMAL: &str = r#"
instances:
  - name: prod
    arguments:
      date_field: LogDate
      generation_interval: Daily
      time_lag_minutes: 0
"#;

    #[test]
    fn minimal_instance_gets_builtin_query() {
        let instances = ConfigLoader::new().parse(MINIMAL, ".").unwrap();
        assert_eq!(instances.len(), 1);
        assert_eq!(instances[0].name(), "prod");
        assert_eq!(
            instances[0].queries,
            vec![QueryTemplate::event_log_file("LogDate")]
        );
    }

    #[test]
    fn empty_document_has_no_instances() {
        assert!(matches!(
            ConfigLoader::new().parse("queries: []\n", "."),
            Err(ConfigError::NoInstances)
        ));
    }

    #[test]
    fn duplicate_instance_names() {
        let yaml = format!("{MINIMAL}{}", MINIMAL.replace("instances:\n", ""));
        assert!(matches!(
            ConfigLoader::new().parse(&yaml, "."),
            Err(ConfigError::DuplicateInstance(name)) if name == "prod"
        ));
    }

    #[test]
    fn malformed_yaml_reports_inline_source() {
        let err = ConfigLoader::new().parse("instances: [", ".").unwrap_err();
        assert!(err.to_string().starts_with("invalid configuration in <inline>"));
    }
}
