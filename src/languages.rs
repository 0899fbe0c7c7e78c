//! Language configuration for compilation and execution

use std::collections::HashMap;
use std::fmt;
use std::fs;
use std::path::Path;
use std::str::FromStr;

use anyhow::Context;
use serde::Deserialize;

/// The closed set of language kinds the sandbox can run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Language {
    /// Interpreted, source passed inline to the interpreter
    Script,
    /// Compiled to class files, then run on the JVM
    Compiled,
    /// SQL evaluated by an in-process engine
    QueryEmbedded,
}

impl Language {
    pub fn name(&self) -> &'static str {
        match self {
            Language::Script => "script",
            Language::Compiled => "compiled",
            Language::QueryEmbedded => "query-embedded",
        }
    }
}

impl fmt::Display for Language {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Language {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "script" => Ok(Language::Script),
            "compiled" => Ok(Language::Compiled),
            "query-embedded" | "query_embedded" => Ok(Language::QueryEmbedded),
            other => anyhow::bail!("Unknown language kind: {}", other),
        }
    }
}

/// Configuration for a supported language
#[derive(Debug, Clone, PartialEq)]
pub struct LanguageConfig {
    pub kind: Language,
    /// Extra names accepted in requests
    pub aliases: Vec<String>,
    /// Compile command template (None if not needed)
    pub compile_command: Option<Vec<String>>,
    /// Run command template (empty for the in-process engine)
    pub run_command: Vec<String>,
    /// Extension of the written source file (e.g., "java")
    pub source_extension: Option<String>,
    /// Entry type name used when the source declares none
    pub default_entry: Option<String>,
}

/// Raw TOML configuration for a language
#[derive(Debug, Deserialize)]
struct RawLanguageConfig {
    compile_command: Option<String>,
    run_command: Option<String>,
    source_extension: Option<String>,
    default_entry: Option<String>,
    #[serde(default)]
    aliases: Vec<String>,
}

/// All configured languages, keyed by kind and by every accepted name
#[derive(Debug, Clone, Default)]
pub struct LanguageTable {
    configs: HashMap<Language, LanguageConfig>,
    names: HashMap<String, Language>,
}

impl LanguageTable {
    /// Table compiled into the binary from `files/languages.toml`
    pub fn builtin() -> anyhow::Result<Self> {
        let content = include_str!(concat!(env!("CARGO_MANIFEST_DIR"), "/files/languages.toml"));
        Self::from_toml_str(content)
    }

    /// Load from a file, or use the built-in table when no path is given
    pub fn load(path: Option<&Path>) -> anyhow::Result<Self> {
        match path {
            Some(path) => {
                let content = fs::read_to_string(path)
                    .with_context(|| format!("Failed to read language config {:?}", path))?;
                Self::from_toml_str(&content)
            }
            None => Self::builtin(),
        }
    }

    pub fn from_toml_str(content: &str) -> anyhow::Result<Self> {
        let raw_configs: HashMap<String, RawLanguageConfig> = toml::from_str(content)?;

        let mut table = Self::default();

        for (name, raw) in raw_configs {
            let kind: Language = name.parse()?;

            let config = LanguageConfig {
                kind,
                aliases: raw.aliases.iter().map(|a| a.trim().to_lowercase()).collect(),
                compile_command: raw.compile_command.map(|cmd| into_command(&cmd)),
                run_command: raw.run_command.map(|cmd| into_command(&cmd)).unwrap_or_default(),
                source_extension: raw.source_extension,
                default_entry: raw.default_entry,
            };
            validate(&config)?;

            // Add main language name
            table.names.insert(kind.name().to_string(), kind);

            // Add aliases
            for alias in &config.aliases {
                if let Some(existing) = table.names.insert(alias.clone(), kind) {
                    if existing != kind {
                        anyhow::bail!(
                            "Alias {} is claimed by both {} and {}",
                            alias,
                            existing,
                            kind
                        );
                    }
                }
            }

            table.configs.insert(kind, config);
        }

        Ok(table)
    }

    /// Resolve a request's language name (case-insensitive, trimmed)
    pub fn resolve(&self, name: &str) -> Option<Language> {
        self.names.get(&name.trim().to_lowercase()).copied()
    }

    pub fn get(&self, kind: Language) -> Option<&LanguageConfig> {
        self.configs.get(&kind)
    }

    pub fn configs(&self) -> impl Iterator<Item = &LanguageConfig> {
        self.configs.values()
    }

    /// Get all accepted language names, sorted
    pub fn supported_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.names.keys().cloned().collect();
        names.sort();
        names
    }
}

fn validate(config: &LanguageConfig) -> anyhow::Result<()> {
    match config.kind {
        Language::Script => {
            if config.run_command.is_empty() {
                anyhow::bail!("Language {} needs a run_command", config.kind);
            }
        }
        Language::Compiled => {
            if config.compile_command.as_ref().map_or(true, |c| c.is_empty())
                || config.run_command.is_empty()
            {
                anyhow::bail!(
                    "Language {} needs both compile_command and run_command",
                    config.kind
                );
            }
        }
        Language::QueryEmbedded => {}
    }
    Ok(())
}

fn into_command(command: &str) -> Vec<String> {
    command.split_whitespace().map(|s| s.to_string()).collect()
}

/// Substitute `{name}` placeholders in every argument of a command template.
///
/// Values are inserted verbatim and never rescanned, so a source containing
/// `{dir}` stays untouched. Unknown placeholders are kept as written.
pub fn expand_command(template: &[String], vars: &[(&str, &str)]) -> Vec<String> {
    template.iter().map(|arg| expand_arg(arg, vars)).collect()
}

fn expand_arg(arg: &str, vars: &[(&str, &str)]) -> String {
    let mut out = String::with_capacity(arg.len());
    let mut rest = arg;

    while let Some(start) = rest.find('{') {
        out.push_str(&rest[..start]);
        let after = &rest[start + 1..];
        match after.find('}') {
            Some(end) => {
                let key = &after[..end];
                match vars.iter().find(|(name, _)| *name == key) {
                    Some((_, value)) => out.push_str(value),
                    None => {
                        out.push('{');
                        out.push_str(key);
                        out.push('}');
                    }
                }
                rest = &after[end + 1..];
            }
            None => {
                out.push_str(&rest[start..]);
                rest = "";
            }
        }
    }
    out.push_str(rest);
    out
}
