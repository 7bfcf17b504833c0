//! Canonical structured event names used across `backlog-broker`.

// Deployment client connection events.
pub const CLIENT_CONNECT_OK: &str = "client_connect_ok";
pub const CLIENT_CONNECT_FAILED: &str = "client_connect_failed";
pub const CLIENT_RECONNECT_SCHEDULED: &str = "client_reconnect_scheduled";
pub const CLIENT_CONNECTION_LOST: &str = "client_connection_lost";
pub const CLIENT_IDLE_PING: &str = "client_idle_ping";
pub const CLIENT_LOOP_STOPPED: &str = "client_loop_stopped";
pub const CLIENT_SEND_FAILED: &str = "client_send_failed";

// Dispatch and acknowledgment events.
pub const DISPATCH_RECEIVE: &str = "dispatch_receive";
pub const DISPATCH_NO_LISTENER: &str = "dispatch_no_listener";
pub const DISPATCH_DUPLICATE: &str = "dispatch_duplicate";
pub const DISPATCH_UNEXPECTED_CONTROL: &str = "dispatch_unexpected_control";
pub const ACK_SENT: &str = "ack_sent";
pub const ACK_WITHHELD: &str = "ack_withheld";
pub const ACK_SEND_FAILED: &str = "ack_send_failed";
pub const LISTENER_REGISTER: &str = "listener_register";
pub const LISTENER_DEREGISTER: &str = "listener_deregister";

// Registry lifecycle events.
pub const REGISTRY_CLIENT_CREATE: &str = "registry_client_create";
pub const REGISTRY_CLIENT_REUSE: &str = "registry_client_reuse";
pub const REGISTRY_CLIENT_RELEASE: &str = "registry_client_release";
pub const REGISTRY_CLIENT_TEARDOWN: &str = "registry_client_teardown";
pub const REGISTRY_RELEASE_UNDERFLOW: &str = "registry_release_underflow";
pub const REGISTRY_RELAY_START: &str = "registry_relay_start";
pub const REGISTRY_RELAY_REUSE: &str = "registry_relay_reuse";
pub const REGISTRY_RELAY_STOP: &str = "registry_relay_stop";

// Serial-forwarder relay events.
pub const RELAY_LISTEN_OK: &str = "relay_listen_ok";
pub const RELAY_STOPPED: &str = "relay_stopped";
pub const RELAY_CLIENT_ACCEPT: &str = "relay_client_accept";
pub const RELAY_CLIENT_HANDSHAKE_FAILED: &str = "relay_client_handshake_failed";
pub const RELAY_CLIENT_CLOSED: &str = "relay_client_closed";
pub const RELAY_CLIENT_LAGGED: &str = "relay_client_lagged";
pub const RELAY_PACKET_TOO_LARGE: &str = "relay_packet_too_large";
pub const RELAY_UPLINK_FAILED: &str = "relay_uplink_failed";
pub const RELAY_ACCEPT_FAILED: &str = "relay_accept_failed";

// Wrapper lifecycle and data-path events.
pub const WRAPPER_START: &str = "wrapper_start";
pub const WRAPPER_START_OK: &str = "wrapper_start_ok";
pub const WRAPPER_START_FAILED: &str = "wrapper_start_failed";
pub const WRAPPER_STOP: &str = "wrapper_stop";
pub const WRAPPER_STOP_OK: &str = "wrapper_stop_ok";
pub const WRAPPER_RELAY_UNAVAILABLE: &str = "wrapper_relay_unavailable";
pub const WRAPPER_DECODE_REJECTED: &str = "wrapper_decode_rejected";
pub const WRAPPER_PUBLISH_FAILED: &str = "wrapper_publish_failed";
pub const WRAPPER_DELIVERY_AFTER_STOP: &str = "wrapper_delivery_after_stop";
pub const WRAPPER_DROPPED_ACTIVE: &str = "wrapper_dropped_active";

// Runtime events.
pub const RUNTIME_LOOP_SPAWN: &str = "runtime_loop_spawn";
pub const RUNTIME_LOOP_JOIN_FAILED: &str = "runtime_loop_join_failed";
