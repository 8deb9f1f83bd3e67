use crate::{visit_kind, ComputeRule, InspectDataplane, RenderRules};
use anyhow::{anyhow, Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use mesh_policy_api::PolicyKind;
use mesh_policy_core::{Direction, Subset, Tag};
use mesh_policy_index::IndexMetrics;
use prometheus_client::registry::Registry;
use serde_json::Value;
use std::{io::Write, path::PathBuf};
use tracing::debug;
use tracing_subscriber::EnvFilter;

#[derive(Debug, Parser)]
#[clap(name = "mesh-policy", about = "Resolves mesh policies into rules")]
pub struct Args {
    #[clap(long, default_value = "mesh_policy=info,warn", env = "MESH_POLICY_LOG")]
    log_level: String,

    #[clap(long, value_enum, default_value = "plain")]
    log_format: LogFormat,

    /// Prints index metrics in the prometheus text format after the command's output.
    #[clap(long, global = true)]
    metrics: bool,

    #[clap(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Prints the rules built for every policy kind.
    Rules {
        /// Policy documents. Each file may hold several documents.
        #[clap(short = 'f', long = "file", required = true)]
        files: Vec<PathBuf>,
    },

    /// Prints the rule a policy kind applies to a set of tags.
    Compute {
        #[clap(short = 'f', long = "file", required = true)]
        files: Vec<PathBuf>,

        #[clap(long)]
        kind: PolicyKind,

        /// A `key=value` or `key!=value` tag of the assignment. May be repeated.
        #[clap(long = "tag")]
        tags: Vec<Tag>,

        #[clap(long, value_enum, default_value = "from")]
        direction: DirectionArg,

        /// Treats the tags as the complete set of tags carried by a workload.
        #[clap(long)]
        element: bool,
    },

    /// Prints the attachment points of a dataplane, grouped by the policy governing them.
    Inspect {
        #[clap(short = 'f', long = "file", required = true)]
        files: Vec<PathBuf>,

        #[clap(long)]
        dataplane: String,

        #[clap(long, default_value = "MeshTrafficPermission")]
        kind: PolicyKind,
    },

    /// Prints the JSON schema of policy and dataplane documents.
    Schema,
}

#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, ValueEnum)]
pub enum LogFormat {
    #[default]
    Plain,
    Json,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, ValueEnum)]
pub enum DirectionArg {
    From,
    To,
}

// === impl Args ===

impl Args {
    #[inline]
    pub fn parse_and_run() -> Result<()> {
        let args = Self::parse();
        args.log_format.try_init(&args.log_level)?;
        args.run(&mut std::io::stdout().lock())
    }

    pub fn run(self, out: &mut impl Write) -> Result<()> {
        let Self {
            metrics: print_metrics,
            command,
            ..
        } = self;

        let mut prom = Registry::with_prefix("mesh_policy");
        let metrics = IndexMetrics::register(&mut prom);

        let output = match command {
            Command::Rules { files } => {
                let docs = crate::load_documents(files.as_slice())?;
                let mut kinds = serde_json::Map::new();
                for kind in PolicyKind::ALL {
                    let rules = visit_kind(
                        kind,
                        RenderRules {
                            docs: &docs,
                            metrics: &metrics,
                        },
                    )?;
                    if let Some(rules) = rules {
                        kinds.insert(kind.to_string(), rules);
                    }
                }
                Value::Object(kinds)
            }

            Command::Compute {
                files,
                kind,
                tags,
                direction,
                element,
            } => {
                let docs = crate::load_documents(files.as_slice())?;
                let assignment = Subset::new(tags);
                visit_kind(
                    kind,
                    ComputeRule {
                        docs: &docs,
                        metrics: &metrics,
                        direction: direction.into(),
                        assignment: &assignment,
                        element,
                    },
                )?
            }

            Command::Inspect {
                files,
                dataplane,
                kind,
            } => {
                let docs = crate::load_documents(files.as_slice())?;
                let dataplane = docs
                    .dataplane(&dataplane)
                    .ok_or_else(|| anyhow!("dataplane {dataplane:?} not found"))?;
                visit_kind(
                    kind,
                    InspectDataplane {
                        docs: &docs,
                        metrics: &metrics,
                        dataplane,
                    },
                )?
            }

            Command::Schema => serde_json::to_value(mesh_policy_api::schema())?,
        };

        serde_json::to_writer_pretty(&mut *out, &output)?;
        writeln!(out)?;

        if print_metrics {
            let mut text = String::new();
            prometheus_client::encoding::text::encode(&mut text, &prom)?;
            out.write_all(text.as_bytes())?;
        }

        debug!("Done");
        Ok(())
    }
}

// === impl LogFormat ===

impl LogFormat {
    /// Installs a global subscriber writing to stderr.
    pub fn try_init(self, filter: &str) -> Result<()> {
        let filter = EnvFilter::try_new(filter).context("invalid log level")?;
        let builder = tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_writer(std::io::stderr);
        match self {
            Self::Plain => builder.try_init(),
            Self::Json => builder.json().try_init(),
        }
        .map_err(|error| anyhow!("failed to initialize logging: {error}"))
    }
}

// === impl DirectionArg ===

impl From<DirectionArg> for Direction {
    fn from(direction: DirectionArg) -> Self {
        match direction {
            DirectionArg::From => Direction::From,
            DirectionArg::To => Direction::To,
        }
    }
}
