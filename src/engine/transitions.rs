use crate::models::ride::RideStatus;

/// The only ways a ride can leave its current state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    Assign,
    Start,
    Complete,
    Cancel,
}

impl Transition {
    /// States the ride must currently be in for this transition to commit.
    pub fn from_states(&self) -> &'static [RideStatus] {
        match self {
            Transition::Assign => &[RideStatus::Requested],
            Transition::Start => &[RideStatus::Assigned],
            Transition::Complete => &[RideStatus::InProgress],
            Transition::Cancel => &[RideStatus::Requested, RideStatus::Assigned],
        }
    }

    pub fn target(&self) -> RideStatus {
        match self {
            Transition::Assign => RideStatus::Assigned,
            Transition::Start => RideStatus::InProgress,
            Transition::Complete => RideStatus::Completed,
            Transition::Cancel => RideStatus::Cancelled,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::Transition;
    use crate::models::ride::RideStatus::{self, *};

    const ALL: [RideStatus; 5] = [Requested, Assigned, InProgress, Completed, Cancelled];

    fn is_legal(from: RideStatus, to: RideStatus) -> bool {
        [
            Transition::Assign,
            Transition::Start,
            Transition::Complete,
            Transition::Cancel,
        ]
        .iter()
        .any(|transition| transition.target() == to && transition.from_states().contains(&from))
    }

    #[test]
    fn only_documented_edges_are_legal() {
        let legal = [
            (Requested, Assigned),
            (Requested, Cancelled),
            (Assigned, InProgress),
            (Assigned, Cancelled),
            (InProgress, Completed),
        ];

        for from in ALL {
            for to in ALL {
                assert_eq!(
                    is_legal(from, to),
                    legal.contains(&(from, to)),
                    "{from:?} -> {to:?}"
                );
            }
        }
    }

    #[test]
    fn terminal_states_have_no_exits() {
        for to in ALL {
            assert!(!is_legal(Completed, to));
            assert!(!is_legal(Cancelled, to));
        }
    }
}
