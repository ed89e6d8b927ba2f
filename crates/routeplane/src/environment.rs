//! Well-known header names, signal values and configuration keys

/// Header carrying the control signal
pub const SIGNAL: &str = "signal";

/// Header tagging a message body as executable topology source
pub const PAYLOAD_CLASSIFIER: &str = "payload-classifier";

/// `payload-classifier` value marking topology source
pub const CODE_CLASSIFIER: &str = "code";

pub const SIG_START: &str = "start";
pub const SIG_STOP: &str = "stop";
pub const SIG_CONFIGURE: &str = "configure";
pub const SIG_TERMINATE: &str = "terminate";

/// Endpoint the control channel consumes from
pub const CONTROL_CHANNEL: &str = "routeplane.channels.control";

/// Endpoint TERMINATE signals are routed to
pub const TERMINATION_CHANNEL: &str = "routeplane.channels.shutdown";

/// Script evaluated when the control channel boots
pub const BOOTSTRAP_SCRIPT_URL: &str = "routeplane.bootstrap.script.url";

/// Prefix for additional scripts loaded after the bootstrap script
pub const EXTENDED_SCRIPT_PREFIX: &str = "routeplane.bootstrap.extended.script";

/// Path list of external configuration files
pub const CONFIGURATION_EXTERNALS: &str = "routeplane.configuration.externals";

/// Topology session reset policy (`retain` or `per-evaluation`)
pub const SESSION_RESET: &str = "routeplane.topology.session.reset";

/// Registry key of the control-channel processor
pub const DEFAULT_PROCESSOR: &str = "routeplane.processors.default.id";

pub const TRACE_ENABLED: &str = "routeplane.trace.enabled";
pub const TRACE_LEVEL: &str = "routeplane.trace.level";
pub const TRACE_SHOW_TARGET: &str = "routeplane.trace.show_target";

/// Values used when no configuration layer supplies the key.
pub fn defaults() -> Vec<(&'static str, &'static str)> {
    vec![
        (CONTROL_CHANNEL, "direct:control-channel"),
        (TERMINATION_CHANNEL, "direct:termination-channel"),
        (BOOTSTRAP_SCRIPT_URL, "builtin:bootstrap"),
        (SESSION_RESET, "retain"),
        (DEFAULT_PROCESSOR, "control-channel-processor"),
        (TRACE_ENABLED, "true"),
        (TRACE_LEVEL, "info"),
        (TRACE_SHOW_TARGET, "false"),
    ]
}
