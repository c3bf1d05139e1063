//! Option descriptors and per-entity configuration values.
//!
//! A [`ConfigOption`] is the immutable description of a setting: its name,
//! value type, static default, which actions it applies to and, if it is
//! user-facing, its help text. [`ConfigValues`] holds the values a single
//! configurable entity has accumulated so far, each tagged with its origin.

use std::fmt;

use anyhow::{bail, Result};
use indexmap::IndexMap;

use crate::util::errors::UserError;

/// The action a tool is performing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Tool {
    Build,
    Install,
    Sdist,
    Wheel,
}

impl Tool {
    /// The name of the action, as used in option applicability.
    pub fn name(&self) -> &'static str {
        match self {
            Tool::Build => "build",
            Tool::Install => "install",
            Tool::Sdist => "sdist",
            Tool::Wheel => "wheel",
        }
    }

    /// The name the tool reports itself as.
    pub fn program(&self) -> String {
        format!("sip-{}", self.name())
    }
}

impl fmt::Display for Tool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Actions that generate and compile code.
pub const COMPILING_TOOLS: &[Tool] = &[Tool::Build, Tool::Install, Tool::Wheel];

/// The type of an option's value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OptionType {
    Str,
    Bool,
    Int,
    List,
}

impl OptionType {
    fn describe(&self) -> &'static str {
        match self {
            OptionType::Str => "a string",
            OptionType::Bool => "a bool",
            OptionType::Int => "an int",
            OptionType::List => "a list",
        }
    }
}

/// A typed option value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Value {
    Str(String),
    Bool(bool),
    Int(i64),
    List(Vec<String>),
}

impl Value {
    pub fn option_type(&self) -> OptionType {
        match self {
            Value::Str(_) => OptionType::Str,
            Value::Bool(_) => OptionType::Bool,
            Value::Int(_) => OptionType::Int,
            Value::List(_) => OptionType::List,
        }
    }

    pub fn str(value: impl Into<String>) -> Value {
        Value::Str(value.into())
    }

    pub fn list<I, S>(items: I) -> Value
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Value::List(items.into_iter().map(Into::into).collect())
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Str(s) => write!(f, "'{}'", s),
            Value::Bool(b) => write!(f, "{}", b),
            Value::Int(i) => write!(f, "{}", i),
            Value::List(l) => write!(f, "[{}]", l.join(", ")),
        }
    }
}

/// Where a value came from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Origin {
    /// A section of pyproject.toml.
    Section(String),
    CommandLine,
    InternalDefault,
    UserDefault,
    /// The project's customisation hook.
    Hook,
    /// Set directly by the program (eg. pre-declared bindings).
    Program,
}

impl fmt::Display for Origin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Origin::Section(section) => write!(f, "[{}]", section),
            Origin::CommandLine => f.write_str("command line"),
            Origin::InternalDefault => f.write_str("internal default"),
            Origin::UserDefault => f.write_str("default"),
            Origin::Hook => f.write_str("project hook"),
            Origin::Program => f.write_str("program"),
        }
    }
}

/// The description of a configurable option.
#[derive(Debug, Clone)]
pub struct ConfigOption {
    pub name: &'static str,
    pub option_type: OptionType,
    pub default: Option<Value>,
    /// The command line flag is `--no-<name>` and sets the option to false.
    pub inverted: bool,
    /// The actions the option applies to, `None` meaning all of them.
    pub tools: Option<&'static [Tool]>,
    /// Only options with help are exposed on the command line.
    pub help: Option<&'static str>,
    pub metavar: Option<&'static str>,
}

impl ConfigOption {
    fn new(name: &'static str, option_type: OptionType) -> Self {
        ConfigOption {
            name,
            option_type,
            default: None,
            inverted: false,
            tools: None,
            help: None,
            metavar: None,
        }
    }

    pub fn string(name: &'static str) -> Self {
        ConfigOption::new(name, OptionType::Str)
    }

    pub fn bool(name: &'static str) -> Self {
        ConfigOption::new(name, OptionType::Bool)
    }

    pub fn int(name: &'static str) -> Self {
        ConfigOption::new(name, OptionType::Int)
    }

    pub fn list(name: &'static str) -> Self {
        ConfigOption::new(name, OptionType::List)
    }

    pub fn default(mut self, value: Value) -> Self {
        debug_assert_eq!(value.option_type(), self.option_type);
        self.default = Some(value);
        self
    }

    pub fn inverted(mut self) -> Self {
        self.inverted = true;
        self
    }

    pub fn tools(mut self, tools: &'static [Tool]) -> Self {
        self.tools = Some(tools);
        self
    }

    pub fn help(mut self, help: &'static str) -> Self {
        self.help = Some(help);
        self
    }

    pub fn metavar(mut self, metavar: &'static str) -> Self {
        self.metavar = Some(metavar);
        self
    }

    /// The name as it is written in pyproject.toml and on the command line.
    pub fn external_name(&self) -> String {
        external_name(self.name)
    }

    /// The long command line flag, without the leading dashes.
    pub fn flag_name(&self) -> String {
        if self.inverted {
            format!("no-{}", self.external_name())
        } else {
            self.external_name()
        }
    }

    pub fn is_user_facing(&self) -> bool {
        self.help.is_some()
    }

    pub fn applies_to(&self, tool: Tool) -> bool {
        self.tools.map_or(true, |tools| tools.contains(&tool))
    }

    /// Convert a value read from a pyproject.toml section.
    pub fn coerce(&self, raw: &toml::Value, section: &str) -> Result<Value, UserError> {
        let invalid = |message: String| UserError::InvalidOption {
            name: self.external_name(),
            section: Some(section.to_string()),
            message,
            detail: None,
        };

        let value = match (self.option_type, raw) {
            (OptionType::Str, toml::Value::String(s)) => Value::Str(s.clone()),

            (OptionType::Bool, toml::Value::Boolean(b)) => Value::Bool(*b),
            (OptionType::Bool, toml::Value::String(s)) => match parse_bool(s) {
                Some(b) => Value::Bool(b),
                None => return Err(invalid(format!("'{}' is not a valid bool", s))),
            },
            (OptionType::Bool, toml::Value::Integer(i)) if *i == 0 || *i == 1 => {
                Value::Bool(*i == 1)
            }

            (OptionType::Int, toml::Value::Integer(i)) => Value::Int(*i),
            (OptionType::Int, toml::Value::String(s)) => match s.trim().parse::<i64>() {
                Ok(i) => Value::Int(i),
                Err(_) => return Err(invalid(format!("'{}' is not a valid int", s))),
            },

            (OptionType::List, toml::Value::Array(items)) => {
                let mut list = Vec::with_capacity(items.len());
                for item in items {
                    match item {
                        toml::Value::String(s) => list.push(s.clone()),
                        other => {
                            return Err(invalid(format!(
                                "the list element {} is not a string",
                                other
                            )))
                        }
                    }
                }
                Value::List(list)
            }
            (OptionType::List, toml::Value::String(s)) => Value::List(split_list(s)),

            (option_type, _) => {
                return Err(invalid(format!("must be {}", option_type.describe())))
            }
        };

        Ok(value)
    }
}

/// Convert an internal option name to its external form.
pub fn external_name(name: &str) -> String {
    name.replace('_', "-")
}

/// Convert an external option name to its internal form.
pub fn internal_name(name: &str) -> String {
    name.replace('-', "_")
}

/// Parse one of the recognised bool tokens.
pub fn parse_bool(s: &str) -> Option<bool> {
    match s.trim().to_ascii_lowercase().as_str() {
        "true" | "yes" | "on" | "1" => Some(true),
        "false" | "no" | "off" | "0" => Some(false),
        _ => None,
    }
}

/// Split a string list on commas and whitespace.
pub fn split_list(s: &str) -> Vec<String> {
    s.split(|c: char| c == ',' || c.is_whitespace())
        .filter(|part| !part.is_empty())
        .map(str::to_string)
        .collect()
}

/// The values of one configurable entity.
#[derive(Debug, Clone, Default)]
pub struct ConfigValues {
    declared: IndexMap<&'static str, OptionType>,
    values: IndexMap<&'static str, (Value, Origin)>,
}

impl ConfigValues {
    /// Create an empty set of values for the given options.
    pub fn new(options: &[ConfigOption]) -> Self {
        let mut declared = IndexMap::new();
        for option in options {
            declared.insert(option.name, option.option_type);
        }

        ConfigValues {
            declared,
            values: IndexMap::new(),
        }
    }

    /// Declare an additional option after creation.
    pub fn declare(&mut self, option: &ConfigOption) {
        self.declared.insert(option.name, option.option_type);
    }

    pub fn is_declared(&self, name: &str) -> bool {
        self.declared.contains_key(name)
    }

    pub fn is_set(&self, name: &str) -> bool {
        self.values.contains_key(name)
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.values.get(name).map(|(value, _)| value)
    }

    pub fn origin(&self, name: &str) -> Option<&Origin> {
        self.values.get(name).map(|(_, origin)| origin)
    }

    /// Set a value, replacing any existing one.
    ///
    /// Setting an undeclared option or a value of the wrong type is a bug in
    /// the caller rather than in the user's configuration.
    pub fn set(&mut self, name: &str, value: Value, origin: Origin) -> Result<()> {
        let Some((&key, &option_type)) = self.declared.get_key_value(name) else {
            bail!("'{}' is not a declared option", name);
        };

        if value.option_type() != option_type {
            bail!(
                "'{}' must be {} but was given {}",
                name,
                option_type.describe(),
                value
            );
        }

        tracing::trace!("{} = {} ({})", name, value, origin);
        self.values.insert(key, (value, origin));
        Ok(())
    }

    pub fn unset(&mut self, name: &str) {
        self.values.shift_remove(name);
    }

    pub fn str(&self, name: &str) -> Option<&str> {
        match self.get(name) {
            Some(Value::Str(s)) => Some(s.as_str()),
            _ => None,
        }
    }

    /// A bool option, unset meaning false.
    pub fn flag(&self, name: &str) -> bool {
        matches!(self.get(name), Some(Value::Bool(true)))
    }

    pub fn bool(&self, name: &str) -> Option<bool> {
        match self.get(name) {
            Some(Value::Bool(b)) => Some(*b),
            _ => None,
        }
    }

    pub fn int(&self, name: &str) -> Option<i64> {
        match self.get(name) {
            Some(Value::Int(i)) => Some(*i),
            _ => None,
        }
    }

    /// A list option, unset meaning empty.
    pub fn list(&self, name: &str) -> &[String] {
        match self.get(name) {
            Some(Value::List(l)) => l.as_slice(),
            _ => &[],
        }
    }

    /// Iterate over the values that have been set, in the order they were
    /// first set.
    pub fn iter(&self) -> impl Iterator<Item = (&'static str, &Value, &Origin)> {
        self.values
            .iter()
            .map(|(name, (value, origin))| (*name, value, origin))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn options() -> Vec<ConfigOption> {
        vec![
            ConfigOption::string("sip_module"),
            ConfigOption::bool("release_gil"),
            ConfigOption::int("concatenate")
                .help("concatenate the generated bindings into N source files")
                .metavar("N")
                .tools(COMPILING_TOOLS),
            ConfigOption::list("tags"),
            ConfigOption::bool("docstrings")
                .inverted()
                .help("disable the generation of docstrings"),
        ]
    }

    #[test]
    fn test_names_and_flags() {
        let opts = options();
        assert_eq!(opts[0].external_name(), "sip-module");
        assert_eq!(opts[4].flag_name(), "no-docstrings");
        assert_eq!(internal_name("sip-module"), "sip_module");
        assert!(opts[2].is_user_facing());
        assert!(!opts[0].is_user_facing());
        assert!(opts[2].applies_to(Tool::Wheel));
        assert!(!opts[2].applies_to(Tool::Sdist));
        assert!(opts[4].applies_to(Tool::Sdist));
    }

    #[test]
    fn test_bool_tokens() {
        for token in ["true", "Yes", "ON", "1"] {
            assert_eq!(parse_bool(token), Some(true), "{}", token);
        }
        for token in ["false", "No", "off", "0"] {
            assert_eq!(parse_bool(token), Some(false), "{}", token);
        }
        assert_eq!(parse_bool("maybe"), None);
    }

    #[test]
    fn test_coerce() {
        let opts = options();
        let section = "tool.sip.bindings";

        assert_eq!(
            opts[1]
                .coerce(&toml::Value::String("yes".into()), section)
                .unwrap(),
            Value::Bool(true)
        );
        assert_eq!(
            opts[2]
                .coerce(&toml::Value::String("4".into()), section)
                .unwrap(),
            Value::Int(4)
        );
        assert_eq!(
            opts[3]
                .coerce(&toml::Value::String("Py_v3, WS_X11 Qt_5".into()), section)
                .unwrap(),
            Value::list(["Py_v3", "WS_X11", "Qt_5"])
        );
        assert_eq!(
            opts[3]
                .coerce(
                    &toml::Value::Array(vec![toml::Value::String("A".into())]),
                    section
                )
                .unwrap(),
            Value::list(["A"])
        );
    }

    #[test]
    fn test_coerce_errors_name_option_and_section() {
        let opts = options();

        let err = opts[2]
            .coerce(&toml::Value::String("4x".into()), "tool.sip.bindings")
            .unwrap_err();
        assert_eq!(
            err.to_string(),
            "'tool.sip.bindings.concatenate': '4x' is not a valid int"
        );

        let err = opts[0]
            .coerce(&toml::Value::Integer(3), "tool.sip.project")
            .unwrap_err();
        assert_eq!(
            err.to_string(),
            "'tool.sip.project.sip-module': must be a string"
        );
    }

    #[test]
    fn test_values_are_type_checked() {
        let mut values = ConfigValues::new(&options());

        values
            .set("sip_module", Value::str("PyQt6.sip"), Origin::CommandLine)
            .unwrap();
        assert_eq!(values.str("sip_module"), Some("PyQt6.sip"));
        assert_eq!(values.origin("sip_module"), Some(&Origin::CommandLine));

        assert!(values
            .set("sip_module", Value::Bool(true), Origin::Program)
            .is_err());
        assert!(values
            .set("unknown", Value::Bool(true), Origin::Program)
            .is_err());
    }

    #[test]
    fn test_unset_getters() {
        let values = ConfigValues::new(&options());
        assert!(!values.flag("release_gil"));
        assert_eq!(values.bool("release_gil"), None);
        assert!(values.list("tags").is_empty());
        assert_eq!(values.int("concatenate"), None);
    }
}
