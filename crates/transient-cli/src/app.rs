//! Console: executes parsed commands against a [`Reclaimer`] backed by the
//! in-process gateway.

use std::fmt::Write as _;
use std::sync::Arc;

use tracing::{debug, warn};
use transient_runtime::{InMemoryGateway, LeafHandle, LeafId, Reclaimer, ScopeId};

use crate::command::{self, Command, HELP};

const CREATED_FORMAT: &str = "%H:%M:%S";

/// What the read loop should do after a line.
#[derive(Debug, PartialEq, Eq)]
pub enum Reply {
    Text(String),
    Silent,
    Quit,
}

pub struct Console {
    prefix: String,
    scope: ScopeId,
    gateway: Arc<InMemoryGateway>,
    reclaimer: Reclaimer<InMemoryGateway>,
}

impl Console {
    pub fn new(
        prefix: impl Into<String>,
        scope: ScopeId,
        gateway: Arc<InMemoryGateway>,
        reclaimer: Reclaimer<InMemoryGateway>,
    ) -> Self {
        Self {
            prefix: prefix.into(),
            scope,
            gateway,
            reclaimer,
        }
    }

    pub async fn handle_line(&self, line: &str) -> Reply {
        match command::parse(&self.prefix, line) {
            None => Reply::Silent,
            Some(Err(e)) => Reply::Text(format!("error: {e}")),
            Some(Ok(cmd)) => {
                debug!(?cmd, "command");
                self.execute(cmd).await
            }
        }
    }

    async fn execute(&self, cmd: Command) -> Reply {
        match cmd {
            Command::NewChannel { name, group } => {
                match self
                    .reclaimer
                    .request_leaf_creation(self.scope, &name, group.as_deref())
                    .await
                {
                    Ok(handle) => Reply::Text(describe_created(&handle)),
                    Err(e) => {
                        warn!(leaf = %name, error = %e, "channel creation failed");
                        Reply::Text(format!("error: {e}"))
                    }
                }
            }
            Command::Join(leaf) => self.occupancy_reply(leaf, self.gateway.join(leaf)),
            Command::Leave(leaf) => self.occupancy_reply(leaf, self.gateway.leave(leaf)),
            Command::List => Reply::Text(self.listing()),
            Command::Sweep => match self.reclaimer.sweep() {
                Ok(n) => Reply::Text(format!("re-armed {n} pending check(s)")),
                Err(e) => Reply::Text(format!("error: {e}")),
            },
            Command::Help => Reply::Text(HELP.to_string()),
            Command::Quit => Reply::Quit,
        }
    }

    fn occupancy_reply<E: std::fmt::Display>(
        &self,
        leaf: LeafId,
        result: Result<usize, E>,
    ) -> Reply {
        match result {
            Ok(occupancy) => Reply::Text(format!("{leaf}: {occupancy} occupant(s)")),
            Err(e) => Reply::Text(format!("error: {e}")),
        }
    }

    fn listing(&self) -> String {
        let groups = self.gateway.groups(self.scope);
        let leaves = self.gateway.leaves(self.scope);
        if groups.is_empty() && leaves.is_empty() {
            return "no channels".to_string();
        }
        let tracked = self.reclaimer.tracked();
        let mut out = String::new();
        for group in &groups {
            let _ = writeln!(
                out,
                "{} {} created={}",
                group.id,
                group.name,
                group.created_at.format(CREATED_FORMAT),
            );
            for leaf in leaves.iter().filter(|l| l.parent == Some(group.id)) {
                let _ = writeln!(
                    out,
                    "  {} {} occupants={} created={}{}",
                    leaf.id,
                    leaf.name,
                    leaf.occupancy,
                    leaf.created_at.format(CREATED_FORMAT),
                    marker(tracked.contains(&leaf.id)),
                );
            }
        }
        for leaf in leaves.iter().filter(|l| l.parent.is_none()) {
            let _ = writeln!(
                out,
                "{} {} occupants={} created={}{}",
                leaf.id,
                leaf.name,
                leaf.occupancy,
                leaf.created_at.format(CREATED_FORMAT),
                marker(tracked.contains(&leaf.id)),
            );
        }
        out.truncate(out.trim_end().len());
        out
    }

    pub fn shutdown(&self) {
        self.reclaimer.shutdown();
    }
}

fn marker(tracked: bool) -> &'static str {
    if tracked {
        " (temporary)"
    } else {
        ""
    }
}

fn describe_created(handle: &LeafHandle) -> String {
    match &handle.group {
        Some(group) if group.created => format!(
            "created {} `{}` in new category {} `{}`",
            handle.id, handle.name, group.id, group.name
        ),
        Some(group) => format!(
            "created {} `{}` in existing category {} `{}`",
            handle.id, handle.name, group.id, group.name
        ),
        None => format!("created {} `{}`", handle.id, handle.name),
    }
}
