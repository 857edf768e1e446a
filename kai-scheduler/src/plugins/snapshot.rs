//! Debug snapshot plugin (spec §6 "Debug HTTP"): when enabled, renders the
//! `GET /get-snapshot` JSON envelope `{snapshot, config, schedulerParams}`
//! for offline replay and visualization. The cache (C1) owns the actual
//! `AddHttpHandler` registration and snapshot construction; this plugin
//! only owns the serialization contract, so it stays decoupled from the
//! cache's internal representation.

use serde::Serialize;

use crate::plugins::Plugin;

#[derive(Serialize)]
struct SnapshotEnvelope<'a> {
    snapshot: &'a serde_json::Value,
    config: &'a serde_json::Value,
    #[serde(rename = "schedulerParams")]
    scheduler_params: &'a serde_json::Value,
}

pub struct SnapshotPlugin;

impl Plugin for SnapshotPlugin {
    fn name(&self) -> &str {
        "Snapshot"
    }
}

impl SnapshotPlugin {
    /// Renders the `/get-snapshot` response body. Callers own deciding
    /// *when* to call this (the cache's http handler, the snapshot-file
    /// writer); this plugin just fixes the wire shape.
    pub fn render(
        &self,
        snapshot: &serde_json::Value,
        config: &serde_json::Value,
        scheduler_params: &serde_json::Value,
    ) -> serde_json::Result<String> {
        serde_json::to_string(&SnapshotEnvelope {
            snapshot,
            config,
            scheduler_params,
        })
    }
}
