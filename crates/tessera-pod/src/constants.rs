//! Well-known labels, annotations, finalizers and ports.

/// Finalizer that holds a member pod until the member shut down cleanly.
pub const FINALIZER_GRACEFUL_SHUTDOWN: &str = "database.tessera.io/graceful-shutdown";
/// Finalizer that delays pod termination while data is moved away.
pub const FINALIZER_DELAY_POD_TERMINATION: &str = "database.tessera.io/delay-pod-termination";

/// Pod annotation forcing an immediate recreation.
pub const ANNOTATION_ROTATE: &str = "deployment.tessera.io/rotate";
/// Pod annotation carrying the member id.
pub const ANNOTATION_MEMBER_ID: &str = "deployment.tessera.io/member";
/// Pod annotation carrying the checksum of the template the pod was built from.
pub const ANNOTATION_POD_SPEC_VERSION: &str = "deployment.tessera.io/pod-spec-version";

pub const LABEL_APP: &str = "app";
pub const LABEL_APP_VALUE: &str = "tessera";
pub const LABEL_DEPLOYMENT: &str = "tessera_deployment";
pub const LABEL_ROLE: &str = "role";

pub const TOPOLOGY_KEY_HOSTNAME: &str = "kubernetes.io/hostname";
pub const NODE_ARCH_LABEL: &str = "kubernetes.io/arch";
pub const DEFAULT_NODE_ARCH: &str = "amd64";

pub const SERVER_CONTAINER_NAME: &str = "server";
pub const DATA_VOLUME_NAME: &str = "data";
pub const DATA_MOUNT_PATH: &str = "/data";
pub const ENCRYPTION_VOLUME_NAME: &str = "encryption-keys";
pub const ENCRYPTION_MOUNT_PATH: &str = "/secrets/encryption";

pub const DATABASE_PORT: i32 = 8529;
pub const SYNC_MASTER_PORT: i32 = 8629;
pub const SYNC_WORKER_PORT: i32 = 8729;
