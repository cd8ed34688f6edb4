use thiserror::Error;

#[derive(Debug, Error)]
pub enum CoreError {
    #[error("team '{team}' has no agents configured")]
    EmptyTeam { team: String },

    #[error("duplicate agent name '{name}' in team '{team}'")]
    DuplicateAgent { team: String, name: String },
}
