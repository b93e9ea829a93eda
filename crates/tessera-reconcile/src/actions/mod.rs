//! Concrete plan actions.
//!
//! | type                        | timeout |
//! |-----------------------------|---------|
//! | AddMember                   | 10 min  |
//! | RemoveMember                | 15 min  |
//! | KillMemberPod               | 10 min  |
//! | RotateMember                | 15 min  |
//! | WaitForMemberUp             | 10 min  |
//! | MemberPodStatusUpdate       | 10 min  |
//! | RuntimeContainerImageUpdate | 10 min  |
//! | EncryptionKeyStatusUpdate   | 10 min  |
//! | DisableClusterScaling       | 10 min  |
//! | EnableClusterScaling        | 10 min  |

use tessera_state::Action as PlannedAction;

use crate::action::Action;

/// Declare a handler struct wrapping its planned action.
macro_rules! planned_action {
    ($name:ident) => {
        pub struct $name {
            action: tessera_state::Action,
        }

        impl $name {
            pub fn create(action: tessera_state::Action) -> Box<dyn crate::action::Action> {
                Box::new(Self { action })
            }
        }
    };
}

pub mod member;
pub mod pod;
pub mod scaling;
pub mod status;

/// Parameter carrying the desired template checksum at planning time.
pub const PARAM_CHECKSUM: &str = "checksum";

pub use tessera_rotation::compare::PARAM_IMAGE;

/// Constructor of a handler for one action type.
pub type Constructor = fn(PlannedAction) -> Box<dyn Action>;
