//! 传输层/应用模块
//!
//! 应用表与各类流量应用：UDP echo、on/off 发送端、packet sink，
//! 以及承载 bulk 发送的简化 TCP。
//!
//! Applications live in one table owned by the network. Servers bind
//! `(node, protocol, port)`; clients bind an ephemeral port on start. All
//! start, stop and timer activity is driven by scheduled events.

pub mod onoff;
pub mod sink;
pub mod tcp;
pub mod udp_echo;

use serde::Serialize;
use std::collections::HashMap;
use std::net::Ipv4Addr;

use tracing::{debug, info};

use crate::net::{
    IpProtocol, Network, NodeId, Packet, Transport, UDP_OVERHEAD_BYTES, with_apps, with_network,
};
use crate::sim::{Event, SimTime, Simulator, World};

use onoff::OnOffApp;
use sink::PacketSink;
use tcp::BulkSend;
use udp_echo::{EchoClient, EchoServer};

/// An IPv4 socket address as `(address, port)`.
pub type Endpoint = (Ipv4Addr, u16);

/// First port handed out to clients.
pub const EPHEMERAL_PORT_BASE: u16 = 49153;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(transparent)]
pub struct AppId(pub usize);

#[derive(Debug, Clone)]
pub enum App {
    EchoServer(EchoServer),
    EchoClient(EchoClient),
    OnOff(OnOffApp),
    Sink(PacketSink),
    Bulk(BulkSend),
}

impl App {
    pub fn kind(&self) -> &'static str {
        match self {
            App::EchoServer(_) => "udp_echo_server",
            App::EchoClient(_) => "udp_echo_client",
            App::OnOff(_) => "on_off",
            App::Sink(_) => "packet_sink",
            App::Bulk(_) => "bulk_send",
        }
    }

    pub fn as_echo_server(&self) -> Option<&EchoServer> {
        match self {
            App::EchoServer(a) => Some(a),
            _ => None,
        }
    }

    pub fn as_echo_client(&self) -> Option<&EchoClient> {
        match self {
            App::EchoClient(a) => Some(a),
            _ => None,
        }
    }

    pub fn as_onoff(&self) -> Option<&OnOffApp> {
        match self {
            App::OnOff(a) => Some(a),
            _ => None,
        }
    }

    pub fn as_sink(&self) -> Option<&PacketSink> {
        match self {
            App::Sink(a) => Some(a),
            _ => None,
        }
    }

    pub fn as_bulk(&self) -> Option<&BulkSend> {
        match self {
            App::Bulk(a) => Some(a),
            _ => None,
        }
    }
}

#[derive(Debug, Clone)]
struct AppSlot {
    node: NodeId,
    app: App,
    running: bool,
}

/// 应用表
#[derive(Debug, Default)]
pub struct Applications {
    slots: Vec<AppSlot>,
    bindings: HashMap<(NodeId, IpProtocol, u16), AppId>,
    next_port: HashMap<NodeId, u16>,
}

impl Applications {
    pub(crate) fn install(&mut self, node: NodeId, app: App) -> AppId {
        let id = AppId(self.slots.len());
        self.slots.push(AppSlot {
            node,
            app,
            running: false,
        });
        id
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    pub fn get(&self, id: AppId) -> Option<&App> {
        self.slots.get(id.0).map(|s| &s.app)
    }

    pub fn node_of(&self, id: AppId) -> Option<NodeId> {
        self.slots.get(id.0).map(|s| s.node)
    }

    pub fn is_running(&self, id: AppId) -> bool {
        self.slots.get(id.0).is_some_and(|s| s.running)
    }

    pub fn iter(&self) -> impl Iterator<Item = (AppId, NodeId, &App)> + '_ {
        self.slots
            .iter()
            .enumerate()
            .map(|(i, s)| (AppId(i), s.node, &s.app))
    }

    /// The app bound to `port` on `node`, if any.
    pub fn listening(&self, node: NodeId, protocol: IpProtocol, port: u16) -> Option<AppId> {
        self.bindings.get(&(node, protocol, port)).copied()
    }

    fn bind(&mut self, node: NodeId, protocol: IpProtocol, port: u16, id: AppId) {
        self.bindings.insert((node, protocol, port), id);
    }

    fn unbind(&mut self, id: AppId) {
        self.bindings.retain(|_, bound| *bound != id);
    }

    fn ephemeral_port(&mut self, node: NodeId) -> u16 {
        let next = self.next_port.entry(node).or_insert(EPHEMERAL_PORT_BASE);
        let port = *next;
        *next = next.checked_add(1).unwrap_or(EPHEMERAL_PORT_BASE);
        port
    }

    pub(crate) fn start(&mut self, id: AppId, sim: &mut Simulator, net: &mut Network) {
        let Some(slot) = self.slots.get(id.0) else {
            return;
        };
        if slot.running {
            return;
        }
        let node = slot.node;
        let (protocol, fixed_port) = match &slot.app {
            App::EchoServer(s) => (Some(IpProtocol::Udp), Some(s.port)),
            App::Sink(s) => (Some(s.protocol), Some(s.port)),
            App::EchoClient(_) | App::OnOff(_) => (Some(IpProtocol::Udp), None),
            // TCP demultiplexes by connection, not by port.
            App::Bulk(_) => (None, None),
        };
        let Some(local_addr) = net.topology().node(node).and_then(|n| n.primary_address()) else {
            debug!(app = id.0, %node, "app node has no address");
            return;
        };
        let local_port = fixed_port.unwrap_or_else(|| self.ephemeral_port(node));
        if let Some(protocol) = protocol {
            self.bind(node, protocol, local_port, id);
        }
        let local = (local_addr, local_port);

        let now = sim.now();
        let Some(slot) = self.slots.get_mut(id.0) else {
            return;
        };
        slot.running = true;
        info!(app = id.0, %node, kind = slot.app.kind(), %now, "▶️ application started");
        net.viz_app(now, id.0, node, slot.app.kind(), true);

        match &mut slot.app {
            App::EchoClient(c) => c.start(id, node, local, sim, net),
            App::OnOff(o) => o.start(id, node, local, sim, net),
            App::Bulk(b) => b.start(node, local, sim, net),
            App::EchoServer(_) | App::Sink(_) => {}
        }
    }

    pub(crate) fn stop(&mut self, id: AppId, sim: &mut Simulator, net: &mut Network) {
        let Some(slot) = self.slots.get_mut(id.0) else {
            return;
        };
        if !slot.running {
            return;
        }
        slot.running = false;
        let node = slot.node;
        if let App::Bulk(b) = &mut slot.app {
            b.stop(net);
        }
        info!(app = id.0, %node, kind = slot.app.kind(), now = %sim.now(), "⏹️ application stopped");
        net.viz_app(sim.now(), id.0, node, slot.app.kind(), false);
        self.unbind(id);
    }

    /// Stop everything without scheduling anything.
    pub(crate) fn stop_all(&mut self) {
        for slot in &mut self.slots {
            slot.running = false;
        }
        self.bindings.clear();
    }

    /// Dispatch a UDP datagram addressed to `at`. Returns false when no
    /// running app is bound to the destination port.
    pub(crate) fn on_udp(&mut self, at: NodeId, pkt: &Packet, sim: &mut Simulator, net: &mut Network) -> bool {
        let Transport::Udp(payload) = pkt.transport else {
            return false;
        };
        let Some(id) = self.listening(at, IpProtocol::Udp, pkt.dst_port) else {
            return false;
        };
        let Some(slot) = self.slots.get_mut(id.0).filter(|s| s.running) else {
            return false;
        };
        match &mut slot.app {
            App::EchoServer(s) => s.on_datagram(at, pkt, payload, sim, net),
            App::EchoClient(c) => c.on_datagram(pkt, payload, sim),
            App::Sink(s) => s.on_receive(pkt.size_bytes.saturating_sub(UDP_OVERHEAD_BYTES), sim.now()),
            App::OnOff(_) | App::Bulk(_) => {}
        }
        true
    }

    /// Payload bytes handed up by TCP to a sink.
    pub(crate) fn on_stream_data(&mut self, id: AppId, bytes: u64, now: SimTime) -> bool {
        match self.slots.get_mut(id.0) {
            Some(AppSlot {
                app: App::Sink(s),
                running: true,
                ..
            }) => {
                s.on_receive(u32::try_from(bytes).unwrap_or(u32::MAX), now);
                true
            }
            _ => false,
        }
    }

    fn on_timer(&mut self, id: AppId, sim: &mut Simulator, net: &mut Network) {
        let Some(slot) = self.slots.get_mut(id.0).filter(|s| s.running) else {
            return;
        };
        let node = slot.node;
        match &mut slot.app {
            App::EchoClient(c) => c.on_timer(id, node, sim, net),
            App::OnOff(o) => o.on_timer(id, node, sim, net),
            _ => {}
        }
    }
}

/// 事件：启动应用
#[derive(Debug)]
pub struct AppStart {
    pub app: AppId,
}

impl Event for AppStart {
    fn execute(self: Box<Self>, sim: &mut Simulator, world: &mut dyn World) {
        let AppStart { app } = *self;
        with_network(world, |net| with_apps(net, |net, apps| apps.start(app, sim, net)));
    }
}

/// 事件：停止应用
#[derive(Debug)]
pub struct AppStop {
    pub app: AppId,
}

impl Event for AppStop {
    fn execute(self: Box<Self>, sim: &mut Simulator, world: &mut dyn World) {
        let AppStop { app } = *self;
        with_network(world, |net| with_apps(net, |net, apps| apps.stop(app, sim, net)));
    }
}

/// 事件：应用的周期性发送
#[derive(Debug)]
pub(crate) struct AppTimer {
    pub app: AppId,
}

impl Event for AppTimer {
    fn execute(self: Box<Self>, sim: &mut Simulator, world: &mut dyn World) {
        let AppTimer { app } = *self;
        with_network(world, |net| with_apps(net, |net, apps| apps.on_timer(app, sim, net)));
    }
}
