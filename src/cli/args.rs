// ABOUTME: Command line argument definitions and parsing using Clap
// ABOUTME: Defines the pause, resume, schedule, resolve and list-paused subcommands

use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

use crate::model::{EntityKind, EntityRef, ScheduleRef};

#[derive(Parser, Debug)]
#[command(name = "extract-pause")]
#[command(about = "Pause and resume Tableau extract refresh tasks without losing their schedules")]
#[command(version)]
pub struct Args {
    #[command(subcommand)]
    pub command: Commands,

    #[arg(short, long, global = true, help = "Enable verbose output")]
    pub verbose: bool,

    #[arg(short, long, global = true, help = "Path to configuration file")]
    pub config: Option<PathBuf>,

    #[arg(long, global = true, help = "Disable colored output")]
    pub no_color: bool,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Snapshot and delete the extract refresh tasks of a workbook or datasource
    Pause {
        #[arg(value_enum, help = "Kind of entity to pause")]
        kind: KindArg,

        #[command(flatten)]
        selector: Selector,

        #[arg(long, help = "Only pause the workbook itself, not its upstream datasources")]
        no_upstream: bool,

        #[arg(long, help = "Dry run - resolve and list tasks without deleting")]
        dry_run: bool,

        #[arg(short, long, help = "Write the report as JSON to this file")]
        output: Option<PathBuf>,
    },

    /// Recreate the tasks paused for a workbook or datasource
    Resume {
        #[arg(value_enum, help = "Kind of entity the pause was invoked on")]
        kind: KindArg,

        #[command(flatten)]
        selector: Selector,

        #[arg(short, long, help = "Write the report as JSON to this file")]
        output: Option<PathBuf>,
    },

    /// Suspend or activate a whole schedule
    Schedule {
        #[arg(value_enum)]
        action: ScheduleAction,

        #[command(flatten)]
        selector: Selector,
    },

    /// Show the paused task snapshots currently on record
    ListPaused {
        #[arg(long, help = "Only show snapshots recorded for this root luid")]
        root_id: Option<String>,
    },

    /// Show which entities and tasks a pause would touch
    Resolve {
        #[arg(value_enum)]
        kind: KindArg,

        #[command(flatten)]
        selector: Selector,

        #[arg(long, help = "Do not follow upstream datasources of a workbook")]
        no_upstream: bool,
    },
}

#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
pub enum KindArg {
    Workbook,
    Datasource,
}

#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
pub enum ScheduleAction {
    Suspend,
    Activate,
}

/// Exactly one of `--id` or `--name`
#[derive(clap::Args, Debug, Clone)]
#[group(required = true, multiple = false)]
pub struct Selector {
    #[arg(long, help = "Server luid")]
    pub id: Option<String>,

    #[arg(long, help = "Exact, case-sensitive name")]
    pub name: Option<String>,
}

impl From<KindArg> for EntityKind {
    fn from(kind: KindArg) -> Self {
        match kind {
            KindArg::Workbook => EntityKind::Workbook,
            KindArg::Datasource => EntityKind::Datasource,
        }
    }
}

impl Selector {
    pub fn entity_ref(&self, kind: KindArg) -> anyhow::Result<EntityRef> {
        match (&self.id, &self.name) {
            (Some(id), None) => Ok(EntityRef::by_id(kind.into(), id.clone())),
            (None, Some(name)) => Ok(EntityRef::by_name(kind.into(), name.clone())),
            _ => Err(anyhow::anyhow!("Specify exactly one of --id or --name")),
        }
    }

    pub fn schedule_ref(&self) -> anyhow::Result<ScheduleRef> {
        match (&self.id, &self.name) {
            (Some(id), None) => Ok(ScheduleRef::Id(id.clone())),
            (None, Some(name)) => Ok(ScheduleRef::Name(name.clone())),
            _ => Err(anyhow::anyhow!("Specify exactly one of --id or --name")),
        }
    }
}

impl Args {
    /// Parse command line arguments
    pub fn parse_args() -> Self {
        Self::parse()
    }
}
