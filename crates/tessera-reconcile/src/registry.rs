//! Static dispatch table from action type to handler constructor.

use std::collections::HashMap;
use std::sync::OnceLock;

use tessera_state::{Action as PlannedAction, ActionType};

use crate::action::Action;
use crate::actions::Constructor;
use crate::actions::member::{AddMember, RemoveMember};
use crate::actions::pod::{KillMemberPod, RotateMember, RuntimeContainerImageUpdate, WaitForMemberUp};
use crate::actions::scaling::{DisableClusterScaling, EnableClusterScaling};
use crate::actions::status::{EncryptionKeyStatusUpdate, MemberPodStatusUpdate};

fn table() -> &'static HashMap<ActionType, Constructor> {
    static TABLE: OnceLock<HashMap<ActionType, Constructor>> = OnceLock::new();
    TABLE.get_or_init(|| {
        let entries: [(ActionType, Constructor); 10] = [
            (ActionType::AddMember, AddMember::create),
            (ActionType::RemoveMember, RemoveMember::create),
            (ActionType::KillMemberPod, KillMemberPod::create),
            (ActionType::RotateMember, RotateMember::create),
            (ActionType::WaitForMemberUp, WaitForMemberUp::create),
            (ActionType::MemberPodStatusUpdate, MemberPodStatusUpdate::create),
            (
                ActionType::RuntimeContainerImageUpdate,
                RuntimeContainerImageUpdate::create,
            ),
            (
                ActionType::EncryptionKeyStatusUpdate,
                EncryptionKeyStatusUpdate::create,
            ),
            (ActionType::DisableClusterScaling, DisableClusterScaling::create),
            (ActionType::EnableClusterScaling, EnableClusterScaling::create),
        ];
        entries.into_iter().collect()
    })
}

/// Handler for a planned action, or `None` for an unregistered type.
pub fn create_action(action: PlannedAction) -> Option<Box<dyn Action>> {
    table().get(&action.type_).map(|create| create(action))
}
