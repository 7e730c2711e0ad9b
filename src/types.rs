/// Raw vendor-reported model string exactly as it appears in telemetry rows.
/// Examples: `ST4000DM000`, `WDC  WUH721816ALE6L4`, `TOSHIBA MG07ACA14TA`
pub type RawModelName = String;
/// Drive serial number, stable per physical device.
/// Example: `ZA13Q88P`
pub type SerialNumber = String;
/// Identifier for the row source feeding a run.
/// Examples: `snapshots`, `synthetic-fleet`
pub type SourceId = String;
/// Zero-based index of a batch producer within one pipeline run.
pub type ProducerId = usize;
/// Count of distinct serial numbers ever observed for one model.
pub type FleetSize = usize;
/// Post-processed model label handed to sinks.
/// Example: `WDC/HGST WUH721816ALE6L4 (27,689)`
pub type DisplayName = String;
