//! The configuration lifecycle shared by the project, builder and bindings.
//!
//! Every configurable entity goes through the same phases in order: merge
//! its pyproject.toml section, merge the command line, apply internal
//! defaults, apply user defaults, then verify. The first two phases and the
//! defaulting live here. Verification is entity specific.

use std::collections::HashMap;
use std::path::Path;

use anyhow::{bail, Result};
use petgraph::algo::toposort;
use petgraph::graph::{DiGraph, NodeIndex};

use crate::core::option::{internal_name, ConfigOption, ConfigValues, Origin, Tool, Value};
use crate::core::pyproject::Metadata;
use crate::core::python::PythonProbe;
use crate::util::errors::UserError;

/// An entity with an option registry and accumulated values.
pub trait Configurable {
    /// The pyproject.toml section the entity is configured from.
    fn section(&self) -> &'static str;

    /// The options the entity declares, including any composed from the
    /// entities it delegates to.
    fn options(&self) -> &[ConfigOption];

    fn values(&self) -> &ConfigValues;

    fn values_mut(&mut self) -> &mut ConfigValues;

    /// Computed defaults.
    fn default_steps(&self) -> Vec<DefaultStep> {
        Vec::new()
    }

    /// Look up a declared option by its internal name.
    fn option(&self, name: &str) -> Option<&ConfigOption> {
        self.options().iter().find(|o| o.name == name)
    }
}

/// Merge a pyproject.toml section into an entity.
///
/// Every key must name a declared option, whether or not that option applies
/// to the current action.
pub fn merge_section<C>(entity: &mut C, table: &toml::Table) -> Result<()>
where
    C: Configurable + ?Sized,
{
    let section = entity.section();

    for (key, raw) in table {
        let name = internal_name(key);

        let Some(option) = entity.option(&name) else {
            return Err(UserError::UnknownOption {
                name: key.clone(),
                section: section.to_string(),
            }
            .into());
        };

        let value = option.coerce(raw, section)?;
        let name = option.name;

        entity
            .values_mut()
            .set(name, value, Origin::Section(section.to_string()))?;
    }

    Ok(())
}

/// Which defaulting pass a step belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DefaultPass {
    /// Values needed by later phases that the user doesn't normally set.
    Internal,
    /// Anything user-facing still unset.
    User,
}

/// What a default computation can see besides the entity's own values.
pub struct DefaultsEnv<'a> {
    pub tool: Tool,
    pub root_dir: &'a Path,
    pub python: &'a PythonProbe,
    pub metadata: &'a Metadata,
    /// The project's values, once its defaults have been applied.
    pub project: Option<&'a ConfigValues>,
}

type ComputeFn = fn(&DefaultsEnv<'_>, &ConfigValues) -> Option<Value>;

/// A computed default for one option.
#[derive(Clone)]
pub struct DefaultStep {
    pub option: &'static str,
    pub pass: DefaultPass,
    /// Options of the same entity the computation reads.
    pub reads: &'static [&'static str],
    pub compute: ComputeFn,
}

impl DefaultStep {
    pub fn internal(
        option: &'static str,
        reads: &'static [&'static str],
        compute: ComputeFn,
    ) -> Self {
        DefaultStep {
            option,
            pass: DefaultPass::Internal,
            reads,
            compute,
        }
    }

    pub fn user(option: &'static str, reads: &'static [&'static str], compute: ComputeFn) -> Self {
        DefaultStep {
            option,
            pass: DefaultPass::User,
            reads,
            compute,
        }
    }
}

impl std::fmt::Debug for DefaultStep {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DefaultStep")
            .field("option", &self.option)
            .field("pass", &self.pass)
            .field("reads", &self.reads)
            .finish()
    }
}

/// Order the steps of one pass so that each runs after the steps computing
/// the options it reads.
pub fn order_steps(steps: &[DefaultStep], pass: DefaultPass) -> Result<Vec<&DefaultStep>> {
    let producers: HashMap<&str, &DefaultStep> = steps.iter().map(|s| (s.option, s)).collect();

    let mut graph: DiGraph<&DefaultStep, ()> = DiGraph::new();
    let mut nodes: HashMap<&str, NodeIndex> = HashMap::new();

    for step in steps.iter().filter(|s| s.pass == pass) {
        if nodes.contains_key(step.option) {
            bail!("more than one default is computed for '{}'", step.option);
        }
        nodes.insert(step.option, graph.add_node(step));
    }

    for step in steps.iter().filter(|s| s.pass == pass) {
        for read in step.reads {
            let Some(producer) = producers.get(read) else {
                continue;
            };

            if pass == DefaultPass::Internal && producer.pass == DefaultPass::User {
                bail!(
                    "the internal default of '{}' reads '{}' which is only defaulted later",
                    step.option,
                    read
                );
            }

            if let (Some(&from), Some(&to)) = (nodes.get(read), nodes.get(step.option)) {
                graph.add_edge(from, to, ());
            }
        }
    }

    match toposort(&graph, None) {
        Ok(order) => Ok(order.into_iter().map(|n| graph[n]).collect()),
        Err(cycle) => bail!(
            "the defaults have a cyclic dependency involving '{}'",
            graph[cycle.node_id()].option
        ),
    }
}

/// Apply one defaulting pass to an entity.
///
/// In the user pass, unset options without a computed default get their
/// static default first so that computed defaults can read them.
pub fn apply_defaults<C>(entity: &mut C, pass: DefaultPass, env: &DefaultsEnv<'_>) -> Result<()>
where
    C: Configurable + ?Sized,
{
    let steps = entity.default_steps();

    if pass == DefaultPass::User {
        let statics: Vec<(&'static str, Value)> = entity
            .options()
            .iter()
            .filter(|o| !steps.iter().any(|s| s.option == o.name))
            .filter_map(|o| o.default.clone().map(|d| (o.name, d)))
            .collect();

        for (name, default) in statics {
            if !entity.values().is_set(name) {
                entity.values_mut().set(name, default, Origin::UserDefault)?;
            }
        }
    }

    let origin = match pass {
        DefaultPass::Internal => Origin::InternalDefault,
        DefaultPass::User => Origin::UserDefault,
    };

    for step in order_steps(&steps, pass)? {
        if entity.values().is_set(step.option) {
            continue;
        }

        if let Some(value) = (step.compute)(env, entity.values()) {
            entity.values_mut().set(step.option, value, origin.clone())?;
        }
    }

    Ok(())
}

/// Log where every value of an entity came from.
pub fn trace_values<C>(entity: &C, label: &str)
where
    C: Configurable + ?Sized,
{
    for (name, value, origin) in entity.values().iter() {
        tracing::debug!("{}: {} = {} ({})", label, name, value, origin);
    }
}
