//! Status helper enums mapping to SMALLSERIAL/SMALLINT lookup tables.
//!
//! Each enum variant's discriminant matches the seed data order (1-based)
//! in the corresponding `*_statuses` database table. The enums also own the
//! lifecycle rules: which transitions are legal and which states are terminal.

use serde::Serialize;

/// Status ID type matching SMALLINT/SMALLSERIAL in the database.
pub type StatusId = i16;

macro_rules! define_status_enum {
    (
        $(#[$meta:meta])*
        $name:ident {
            $( $(#[$vmeta:meta])* $variant:ident = $val:literal => $label:literal ),+ $(,)?
        }
    ) => {
        $(#[$meta])*
        #[repr(i16)]
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
        #[serde(rename_all = "snake_case")]
        pub enum $name {
            $( $(#[$vmeta])* $variant = $val ),+
        }

        impl $name {
            /// Every variant, in id order.
            pub const ALL: &'static [Self] = &[$(Self::$variant),+];

            /// Ids of the statuses from which `next` may be entered, for the
            /// `status_id = ANY(..)` guard of a conditional update.
            pub fn source_ids(next: Self) -> Vec<StatusId> {
                Self::ALL
                    .iter()
                    .copied()
                    .filter(|s| s.can_transition_to(next))
                    .map(Self::id)
                    .collect()
            }

            /// Return the database status ID.
            pub fn id(self) -> StatusId {
                self as StatusId
            }

            /// Look up a status by its database ID.
            pub fn from_id(id: StatusId) -> Option<Self> {
                match id {
                    $( $val => Some(Self::$variant), )+
                    _ => None,
                }
            }

            /// The lowercase name stored in the lookup table.
            pub fn as_str(self) -> &'static str {
                match self {
                    $( Self::$variant => $label, )+
                }
            }
        }

        impl From<$name> for StatusId {
            fn from(value: $name) -> Self {
                value as StatusId
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.write_str(self.as_str())
            }
        }
    };
}

define_status_enum! {
    /// Dream (generation request) lifecycle status.
    DreamStatus {
        Draft = 1 => "draft",
        Processing = 2 => "processing",
        Completed = 3 => "completed",
        Failed = 4 => "failed",
    }
}

define_status_enum! {
    /// Run (execution attempt) lifecycle status.
    RunStatus {
        Pending = 1 => "pending",
        Generating = 2 => "generating",
        Completed = 3 => "completed",
        Failed = 4 => "failed",
    }
}

impl RunStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }

    /// Transitions are one-directional: pending -> generating -> terminal.
    /// A pending run may fail directly (spawn failure, cancellation).
    pub fn can_transition_to(self, next: RunStatus) -> bool {
        matches!(
            (self, next),
            (Self::Pending, Self::Generating)
                | (Self::Pending, Self::Failed)
                | (Self::Generating, Self::Completed)
                | (Self::Generating, Self::Failed)
        )
    }

    /// The dream status a terminal run cascades to.
    pub fn cascaded_dream_status(self) -> Option<DreamStatus> {
        match self {
            Self::Completed => Some(DreamStatus::Completed),
            Self::Failed => Some(DreamStatus::Failed),
            _ => None,
        }
    }
}

impl DreamStatus {
    /// A new run may only start when the dream is not already processing.
    pub fn accepts_new_run(self) -> bool {
        self != Self::Processing
    }

    pub fn can_transition_to(self, next: DreamStatus) -> bool {
        match (self, next) {
            (Self::Processing, Self::Processing) => false,
            (_, Self::Processing) => true,
            (Self::Processing, Self::Completed | Self::Failed | Self::Draft) => true,
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dream_status_ids_match_seed_data() {
        assert_eq!(DreamStatus::Draft.id(), 1);
        assert_eq!(DreamStatus::Processing.id(), 2);
        assert_eq!(DreamStatus::Completed.id(), 3);
        assert_eq!(DreamStatus::Failed.id(), 4);
    }

    #[test]
    fn run_status_ids_match_seed_data() {
        assert_eq!(RunStatus::Pending.id(), 1);
        assert_eq!(RunStatus::Generating.id(), 2);
        assert_eq!(RunStatus::Completed.id(), 3);
        assert_eq!(RunStatus::Failed.id(), 4);
    }

    #[test]
    fn status_into_status_id() {
        let id: StatusId = RunStatus::Generating.into();
        assert_eq!(id, 2);
    }

    #[test]
    fn from_id_round_trips() {
        for status in [
            RunStatus::Pending,
            RunStatus::Generating,
            RunStatus::Completed,
            RunStatus::Failed,
        ] {
            assert_eq!(RunStatus::from_id(status.id()), Some(status));
        }
        assert_eq!(RunStatus::from_id(0), None);
        assert_eq!(DreamStatus::from_id(5), None);
    }

    #[test]
    fn names_match_lookup_table() {
        assert_eq!(RunStatus::Generating.as_str(), "generating");
        assert_eq!(DreamStatus::Processing.to_string(), "processing");
        assert_eq!(
            serde_json::to_value(RunStatus::Failed).unwrap(),
            serde_json::json!("failed")
        );
    }

    #[test]
    fn run_transitions_are_one_directional() {
        use RunStatus::*;
        assert!(Pending.can_transition_to(Generating));
        assert!(Pending.can_transition_to(Failed));
        assert!(Generating.can_transition_to(Completed));
        assert!(Generating.can_transition_to(Failed));

        assert!(!Pending.can_transition_to(Completed));
        assert!(!Generating.can_transition_to(Pending));
        assert!(!Completed.can_transition_to(Failed));
        assert!(!Failed.can_transition_to(Generating));
        assert!(!Failed.can_transition_to(Completed));
    }

    #[test]
    fn terminal_run_statuses() {
        assert!(RunStatus::Completed.is_terminal());
        assert!(RunStatus::Failed.is_terminal());
        assert!(!RunStatus::Pending.is_terminal());
        assert!(!RunStatus::Generating.is_terminal());
    }

    #[test]
    fn update_guards_follow_transition_rules() {
        assert_eq!(RunStatus::source_ids(RunStatus::Generating), vec![1]);
        assert_eq!(RunStatus::source_ids(RunStatus::Completed), vec![2]);
        // Failing is allowed from every non-terminal state.
        assert_eq!(RunStatus::source_ids(RunStatus::Failed), vec![1, 2]);
        assert!(RunStatus::source_ids(RunStatus::Pending).is_empty());

        assert_eq!(DreamStatus::source_ids(DreamStatus::Processing), vec![1, 3, 4]);
        assert_eq!(DreamStatus::source_ids(DreamStatus::Draft), vec![2]);
        assert_eq!(DreamStatus::source_ids(DreamStatus::Failed), vec![2]);
    }

    #[test]
    fn terminal_runs_cascade_to_dream() {
        assert_eq!(
            RunStatus::Completed.cascaded_dream_status(),
            Some(DreamStatus::Completed)
        );
        assert_eq!(
            RunStatus::Failed.cascaded_dream_status(),
            Some(DreamStatus::Failed)
        );
        assert_eq!(RunStatus::Generating.cascaded_dream_status(), None);
    }

    #[test]
    fn dream_rejects_second_run_while_processing() {
        assert!(DreamStatus::Draft.accepts_new_run());
        assert!(DreamStatus::Failed.accepts_new_run());
        assert!(DreamStatus::Completed.accepts_new_run());
        assert!(!DreamStatus::Processing.accepts_new_run());
    }

    #[test]
    fn dream_transitions() {
        use DreamStatus::*;
        assert!(Draft.can_transition_to(Processing));
        assert!(Failed.can_transition_to(Processing));
        assert!(Processing.can_transition_to(Completed));
        assert!(Processing.can_transition_to(Draft));
        assert!(!Processing.can_transition_to(Processing));
        assert!(!Draft.can_transition_to(Completed));
    }
}
