#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum StatsError {
    #[error("could not parse time amount `{input}`: no numeric amount found")]
    MissingAmount { input: String },

    #[error("could not parse time amount `{input}`: unrecognized timeframe suffix")]
    UnknownTimeframe { input: String },

    #[error("stats actor has already shut down")]
    ActorGone,
}
