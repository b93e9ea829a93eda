//! tessera-pod — everything needed to turn a member into a pod.
//!
//! The [`PodCreator`] variant is picked once per member from its server
//! group and exposes the same capability set for every role. Rendering
//! produces a [`MemberPodTemplate`](tessera_state::MemberPodTemplate)
//! whose checksum drives rotation decisions.

pub mod affinity;
pub mod constants;
pub mod creator;
pub mod error;
pub mod names;
pub mod template;
pub mod tolerations;

pub use creator::PodCreator;
pub use error::{PodError, PodResult};
pub use template::{RenderContext, build_pod, pod_spec_version, render_member_template};
