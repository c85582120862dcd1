//! Parameter control plane (§4.6): background OSC and MIDI listeners plus
//! UI keystroke dispatch, all routed into a running [`Graph`] without
//! disturbing the real-time audio thread.
//!
//! Grounded on `original_source/osc.c` (bind a base port, increment until
//! one is free, announce the chosen port on stderr) and `original_source/
//! midi.c` (a background thread polling a MIDI input endpoint, writing
//! Control Change messages into the shared CC table that `patchbay-midi`
//! already owns). The audio thread and these background threads share one
//! patch: rather than invent per-module locking (the original's function-
//! table modules have no natural Rust equivalent of "each module owns its
//! own mutex"), the whole [`Graph`] is wrapped in one `Mutex` and every
//! side — the audio callback running a block, a keystroke, an OSC
//! message, applies one `set_param`/`handle_input` call and releases the
//! lock immediately, matching §5's rule that nothing holds a lock across
//! a DSP inner loop.

use std::io;
use std::net::UdpSocket;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;

use patchbay_core::InputKey;
use patchbay_patch::Graph;
use thiserror::Error;

/// Number of consecutive ports tried from the configured base before
/// giving up (§6: "try a base port, increment until free").
const OSC_PORT_SEARCH_RANGE: u16 = 1000;

/// Failure starting a control-plane listener.
#[derive(Debug, Error)]
pub enum ControlError {
    /// No free UDP port was found in the search range starting at the
    /// configured base port.
    #[error("no free OSC port found starting at {base}")]
    NoFreeOscPort {
        /// Base port the search started from.
        base: u16,
    },
    /// The OSC socket could not be configured (e.g. `set_nonblocking`).
    #[error("OSC socket setup failed: {0}")]
    OscSetup(#[source] io::Error),
    /// A requested MIDI input device name filter matched nothing.
    #[error("no MIDI input device matched filter {filter:?}")]
    MidiDeviceNotFound {
        /// The filter string that matched nothing.
        filter: String,
    },
    /// The `midir` backend failed to initialize or connect.
    #[error("MIDI input setup failed: {0}")]
    MidiSetup(String),
}

/// Applies one fully-decoded OSC `/<alias>/<param> <float>` message to the
/// patch (§4.6's "locates the module by alias and calls `set_param`").
///
/// Unknown alias or parameter is silently logged (§6: "errors ... are
/// silently logged"), never surfaced as an `Err` — a malformed or stale
/// OSC message must never interrupt the audio thread's access to the
/// same lock.
fn dispatch_osc(graph: &Mutex<Graph>, alias: &str, param: &str, value: f32) {
    let mut graph = graph.lock().unwrap_or_else(|e| e.into_inner());
    match graph.module_mut(alias) {
        Some(module) => module.set_param(param, value),
        None => tracing::warn!(alias, param, "OSC message addressed unknown alias"),
    }
}

/// Parses an OSC address pattern of the shape `/<alias>/<param>` into its
/// two path segments, or `None` if it doesn't have exactly two.
fn split_osc_address(addr: &str) -> Option<(&str, &str)> {
    let mut segments = addr.trim_start_matches('/').splitn(2, '/');
    let alias = segments.next()?;
    let param = segments.next()?;
    if alias.is_empty() || param.is_empty() || param.contains('/') {
        return None;
    }
    Some((alias, param))
}

/// Binds a UDP socket on the first free port starting at `base`,
/// matching `osc.c`'s "try a base port, increment until free" discovery.
fn bind_osc_socket(base: u16) -> Result<(UdpSocket, u16), ControlError> {
    for offset in 0..OSC_PORT_SEARCH_RANGE {
        let port = base.saturating_add(offset);
        if let Ok(socket) = UdpSocket::bind(("0.0.0.0", port)) {
            return Ok((socket, port));
        }
    }
    Err(ControlError::NoFreeOscPort { base })
}

fn handle_osc_packet(bytes: &[u8], graph: &Mutex<Graph>) {
    let packet = match rosc::decoder::decode_udp(bytes) {
        Ok((_, packet)) => packet,
        Err(err) => {
            tracing::warn!(%err, "malformed OSC packet");
            return;
        }
    };
    dispatch_osc_packet(packet, graph);
}

fn dispatch_osc_packet(packet: rosc::OscPacket, graph: &Mutex<Graph>) {
    match packet {
        rosc::OscPacket::Message(msg) => {
            let Some((alias, param)) = split_osc_address(&msg.addr) else {
                tracing::warn!(addr = %msg.addr, "OSC address is not /<alias>/<param>");
                return;
            };
            let value = match msg.args.first() {
                Some(rosc::OscType::Float(v)) => *v,
                Some(rosc::OscType::Double(v)) => *v as f32,
                Some(rosc::OscType::Int(v)) => *v as f32,
                other => {
                    tracing::warn!(addr = %msg.addr, ?other, "OSC message missing a numeric argument");
                    return;
                }
            };
            dispatch_osc(graph, alias, param, value);
        }
        rosc::OscPacket::Bundle(bundle) => {
            for inner in bundle.content {
                dispatch_osc_packet(inner, graph);
            }
        }
    }
}

/// Runs the OSC receive loop until `shutdown` is set (§5's "OSC thread —
/// a background thread dedicated to the OSC server's receive loop").
fn osc_listen_loop(socket: UdpSocket, graph: Arc<Mutex<Graph>>, shutdown: Arc<AtomicBool>) {
    let mut buf = [0u8; 1536];
    while !shutdown.load(Ordering::Relaxed) {
        match socket.recv(&mut buf) {
            Ok(len) => handle_osc_packet(&buf[..len], &graph),
            Err(err) if err.kind() == io::ErrorKind::WouldBlock || err.kind() == io::ErrorKind::TimedOut => {}
            Err(err) => tracing::warn!(%err, "OSC socket read failed"),
        }
    }
}

/// Forwards raw MIDI Control Change bytes into `patchbay-midi`'s shared
/// CC table (§4.6's "incoming Control-Change messages ... update a
/// process-wide CC state table").
///
/// Anything other than a Control Change status byte (`0xB0..=0xBF`) is
/// ignored — this control plane only consumes CC, matching §1's Non-goal
/// list (no note/pitch-bend routing).
fn handle_midi_bytes(bytes: &[u8]) {
    let [status, cc, value] = bytes else { return };
    if (0xB0..=0xBF).contains(status) {
        let channel = (status & 0x0F) + 1;
        patchbay_midi::record_cc(channel, *cc, *value);
    }
}

/// A running control plane: owns the background OSC and MIDI listener
/// threads for as long as it's alive, and exposes keystroke dispatch for
/// the UI thread to call directly.
pub struct ControlPlane {
    graph: Arc<Mutex<Graph>>,
    osc_port: u16,
    shutdown: Arc<AtomicBool>,
    osc_thread: Option<JoinHandle<()>>,
    midi_connection: Option<midir::MidiInputConnection<()>>,
}

impl ControlPlane {
    /// Starts the OSC listener (and, if a MIDI input is available, the
    /// MIDI listener) for `graph`.
    ///
    /// `osc_base_port` is the port search start (§6). `midi_filter`, if
    /// given, restricts connection to input ports whose name contains
    /// the substring; `None` accepts any MIDI input, and no input device
    /// at all is a degraded-and-continue condition (§7: "MIDI device not
    /// found ⇒ MIDI-to-CV modules emit zero"), not a fatal error.
    pub fn start(
        graph: Arc<Mutex<Graph>>,
        osc_base_port: u16,
        midi_filter: Option<&str>,
    ) -> Result<Self, ControlError> {
        let (socket, osc_port) = bind_osc_socket(osc_base_port)?;
        socket.set_read_timeout(Some(std::time::Duration::from_millis(200))).map_err(ControlError::OscSetup)?;
        tracing::info!(port = osc_port, "OSC listener bound");

        let shutdown = Arc::new(AtomicBool::new(false));
        let osc_thread = {
            let graph = graph.clone();
            let shutdown = shutdown.clone();
            std::thread::spawn(move || osc_listen_loop(socket, graph, shutdown))
        };

        let midi_connection = match start_midi_listener(midi_filter) {
            Ok(conn) => Some(conn),
            Err(err) => {
                tracing::warn!(%err, "MIDI input unavailable, continuing without MIDI");
                patchbay_midi::reset();
                None
            }
        };

        Ok(Self {
            graph,
            osc_port,
            shutdown,
            osc_thread: Some(osc_thread),
            midi_connection,
        })
    }

    /// The UDP port the OSC listener ended up bound to, after the
    /// base-port-plus-increment search.
    pub fn osc_port(&self) -> u16 {
        self.osc_port
    }

    /// Whether a MIDI input device is connected.
    pub fn midi_connected(&self) -> bool {
        self.midi_connection.is_some()
    }

    /// Broadcasts one keystroke to every module's `handle_input` (§4.6's
    /// "UI thread reads one key per tick and forwards it to every
    /// module's `handle_input`").
    pub fn dispatch_key(&self, key: InputKey) {
        let mut graph = self.graph.lock().unwrap_or_else(|e| e.into_inner());
        graph.for_each_module_mut(|_alias, module| module.handle_input(key));
    }

    /// Stops the OSC listener thread. MIDI teardown happens when the
    /// underlying `midir` connection is dropped.
    pub fn shutdown(&mut self) {
        self.shutdown.store(true, Ordering::Relaxed);
        if let Some(handle) = self.osc_thread.take() {
            let _ = handle.join();
        }
        self.midi_connection = None;
    }
}

impl Drop for ControlPlane {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn start_midi_listener(filter: Option<&str>) -> Result<midir::MidiInputConnection<()>, ControlError> {
    let input = midir::MidiInput::new("patchbay").map_err(|e| ControlError::MidiSetup(e.to_string()))?;
    let ports = input.ports();
    let port = match filter {
        Some(needle) => ports
            .iter()
            .find(|p| {
                input
                    .port_name(p)
                    .map(|name| name.contains(needle))
                    .unwrap_or(false)
            })
            .ok_or_else(|| ControlError::MidiDeviceNotFound {
                filter: needle.to_string(),
            })?,
        None => ports.first().ok_or_else(|| ControlError::MidiDeviceNotFound {
            filter: String::new(),
        })?,
    };
    let port_name = input.port_name(port).unwrap_or_default();
    input
        .connect(
            port,
            "patchbay-cc-input",
            |_timestamp, bytes, _| handle_midi_bytes(bytes),
            (),
        )
        .map_err(|e| ControlError::MidiSetup(format!("{port_name}: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn splits_alias_and_param() {
        assert_eq!(split_osc_address("/clk1/bpm"), Some(("clk1", "bpm")));
        assert_eq!(split_osc_address("clk1/bpm"), Some(("clk1", "bpm")));
    }

    #[test]
    fn rejects_malformed_addresses() {
        assert_eq!(split_osc_address("/onlyalias"), None);
        assert_eq!(split_osc_address("/a/b/c"), None);
        assert_eq!(split_osc_address("//bpm"), None);
    }

    #[test]
    fn binds_to_first_free_port() {
        let (_held, base) = bind_osc_socket(0).unwrap();
        let (_second, port) = bind_osc_socket(base).unwrap();
        assert_ne!(base, port);
    }

    #[test]
    fn dispatch_sets_param_on_the_named_alias() {
        let text = "vco:osc1 freq=440\n";
        let registry = {
            let mut r = patchbay_registry::ModuleRegistry::new();
            r.register(
                patchbay_registry::ModuleDescriptor {
                    id: "vco",
                    name: "VCO",
                    description: "test stub",
                },
                |_config, _sr| {
                    struct Stub(f32);
                    impl patchbay_core::Module for Stub {
                        fn set_param(&mut self, name: &str, value: f32) {
                            if name == "freq" {
                                self.0 = value;
                            }
                        }
                        fn get_param(&self, name: &str) -> Option<f32> {
                            (name == "freq").then_some(self.0)
                        }
                    }
                    Ok(Box::new(Stub(0.0)))
                },
            );
            r
        };
        let graph = Graph::build(text, &registry, 48000.0).unwrap();
        let graph = Arc::new(Mutex::new(graph));
        dispatch_osc(&graph, "osc1", "freq", 880.0);
        let mut locked = graph.lock().unwrap();
        assert_eq!(locked.module_mut("osc1").unwrap().get_param("freq"), Some(880.0));
    }
}
