//! TCP（简化版）协议实现
//!
//! 承载 bulk 发送所需的功能：
//! - 三次握手的简化版（SYN / SYN-ACK，数据段即视为第三次握手）
//! - Reno 风格的拥塞控制（慢启动 + AIMD，含 3 dupACK 快速重传/快速恢复）
//! - RFC 6298 的 RTO 估计，Karn 规则，指数退避
//! - 接收端乱序缓存与累计 ACK
//!
//! 不实现窗口缩放、SACK、FIN 挥手等。A connection holds the state of both
//! ends; segments carry the connection id so the receiving end is found
//! without port demultiplexing.

use std::collections::BTreeMap;

use tracing::{debug, info, warn};

use super::{AppId, Applications, Endpoint};
use crate::net::{
    IpProtocol, Network, NodeId, Packet, TCP_OVERHEAD_BYTES, TcpConnId, TcpSegment, Transport,
    with_network, with_tcp_stack,
};
use crate::sim::{Event, SimTime, Simulator, World};

#[derive(Debug, Clone)]
pub struct TcpConfig {
    /// MSS（数据段载荷大小，字节）
    pub mss: u32,
    /// 初始 cwnd（MSS 个数）
    pub init_cwnd_segments: u32,
    /// 初始 ssthresh（字节）
    pub init_ssthresh_bytes: u64,
    /// 接收窗口（字节），不随时间变化
    pub rwnd_bytes: u64,
    /// 发送缓存（字节）
    pub send_buffer_bytes: u64,
    pub init_rto: SimTime,
    pub min_rto: SimTime,
    pub max_rto: SimTime,
    /// 时钟粒度 G
    pub clock_granularity: SimTime,
}

impl Default for TcpConfig {
    fn default() -> Self {
        Self {
            mss: 536,
            init_cwnd_segments: 10,
            init_ssthresh_bytes: 65_535,
            rwnd_bytes: 131_072,
            send_buffer_bytes: 131_072,
            init_rto: SimTime::from_secs(1),
            min_rto: SimTime::from_millis(200),
            max_rto: SimTime::from_secs(60),
            clock_granularity: SimTime::from_millis(1),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TcpState {
    SynSent,
    Established,
    /// Every byte the sender was asked for has been acknowledged.
    Done,
    /// Closed by the application before finishing.
    Stopped,
}

#[derive(Debug, Clone)]
pub struct TcpConn {
    id: TcpConnId,
    flow_id: u64,
    cfg: TcpConfig,
    state: TcpState,
    client: NodeId,
    local: Endpoint,
    remote: Endpoint,
    server: Option<NodeId>,
    sink: Option<AppId>,
    /// 0 means unbounded.
    max_bytes: u64,
    send_size: u64,

    // sender
    written: u64,
    next_seq: u64,
    last_acked: u64,
    cwnd_bytes: u64,
    ssthresh_bytes: u64,
    dup_acks: u32,
    recover: Option<u64>,
    inflight: BTreeMap<u64, u32>,
    srtt: Option<SimTime>,
    rttvar: SimTime,
    rto: SimTime,
    rto_gen: u64,
    rto_armed: bool,
    /// (end of timed bytes, send time); cleared on retransmission.
    timing: Option<(u64, SimTime)>,
    syn_sent_at: Option<SimTime>,

    // receiver
    rcv_nxt: u64,
    ooo: BTreeMap<u64, u32>,

    // stats
    retransmits: u64,
    timeouts: u64,
    start_at: SimTime,
    established_at: Option<SimTime>,
    done_at: Option<SimTime>,
}

impl TcpConn {
    #[allow(clippy::too_many_arguments)]
    fn new(
        id: TcpConnId,
        flow_id: u64,
        cfg: TcpConfig,
        client: NodeId,
        local: Endpoint,
        remote: Endpoint,
        max_bytes: u64,
        send_size: u64,
        now: SimTime,
    ) -> Self {
        let mss = u64::from(cfg.mss);
        Self {
            id,
            flow_id,
            state: TcpState::SynSent,
            client,
            local,
            remote,
            server: None,
            sink: None,
            max_bytes,
            send_size: send_size.max(1),
            written: 0,
            next_seq: 0,
            last_acked: 0,
            cwnd_bytes: mss.saturating_mul(u64::from(cfg.init_cwnd_segments.max(1))),
            ssthresh_bytes: cfg.init_ssthresh_bytes.max(2 * mss),
            dup_acks: 0,
            recover: None,
            inflight: BTreeMap::new(),
            srtt: None,
            rttvar: SimTime::ZERO,
            rto: cfg.init_rto,
            rto_gen: 0,
            rto_armed: false,
            timing: None,
            syn_sent_at: None,
            rcv_nxt: 0,
            ooo: BTreeMap::new(),
            retransmits: 0,
            timeouts: 0,
            start_at: now,
            established_at: None,
            done_at: None,
            cfg,
        }
    }

    pub fn id(&self) -> TcpConnId {
        self.id
    }

    pub fn flow_id(&self) -> u64 {
        self.flow_id
    }

    pub fn state(&self) -> TcpState {
        self.state
    }

    pub fn client(&self) -> NodeId {
        self.client
    }

    /// Known once the SYN reached a listener.
    pub fn server(&self) -> Option<NodeId> {
        self.server
    }

    pub fn bytes_acked(&self) -> u64 {
        self.last_acked
    }

    /// In-order bytes handed to the sink.
    pub fn bytes_received(&self) -> u64 {
        self.rcv_nxt
    }

    pub fn cwnd_bytes(&self) -> u64 {
        self.cwnd_bytes
    }

    pub fn ssthresh_bytes(&self) -> u64 {
        self.ssthresh_bytes
    }

    pub fn srtt(&self) -> Option<SimTime> {
        self.srtt
    }

    pub fn rto(&self) -> SimTime {
        self.rto
    }

    pub fn retransmits(&self) -> u64 {
        self.retransmits
    }

    pub fn timeouts(&self) -> u64 {
        self.timeouts
    }

    pub fn start_time(&self) -> SimTime {
        self.start_at
    }

    pub fn established_time(&self) -> Option<SimTime> {
        self.established_at
    }

    pub fn done_time(&self) -> Option<SimTime> {
        self.done_at
    }

    pub fn is_done(&self) -> bool {
        self.state == TcpState::Done
    }

    fn is_active(&self) -> bool {
        matches!(self.state, TcpState::SynSent | TcpState::Established)
    }

    fn limit(&self) -> u64 {
        if self.max_bytes == 0 { u64::MAX } else { self.max_bytes }
    }

    /// The application keeps the send buffer topped up in `send_size` chunks.
    fn fill_send_buffer(&mut self) {
        let limit = self.limit();
        while self.written < limit && self.written - self.last_acked < self.cfg.send_buffer_bytes {
            self.written = self.written.saturating_add(self.send_size).min(limit);
        }
    }

    /// RFC 6298 section 2.
    fn on_rtt_sample(&mut self, r: SimTime) {
        match self.srtt {
            None => {
                self.srtt = Some(r);
                self.rttvar = SimTime(r.0 / 2);
            }
            Some(srtt) => {
                let delta = srtt.0.abs_diff(r.0);
                self.rttvar = SimTime((3 * self.rttvar.0 + delta) / 4);
                self.srtt = Some(SimTime((7 * srtt.0 + r.0) / 8));
            }
        }
        let srtt = self.srtt.unwrap_or(r);
        let var = SimTime(self.rttvar.0.saturating_mul(4)).max(self.cfg.clock_granularity);
        self.rto = srtt
            .saturating_add(var)
            .max(self.cfg.min_rto)
            .min(self.cfg.max_rto);
    }

    fn arm_rto(&mut self, sim: &mut Simulator) {
        self.rto_gen += 1;
        self.rto_armed = true;
        sim.schedule_in(
            self.rto,
            TcpRto {
                conn_id: self.id,
                generation: self.rto_gen,
            },
        );
    }

    fn disarm_rto(&mut self) {
        self.rto_gen += 1;
        self.rto_armed = false;
    }

    fn send_to_server(&self, size: u32, seg: TcpSegment, sim: &mut Simulator, net: &mut Network) {
        let pkt = net.make_packet(
            self.flow_id,
            self.local,
            self.remote,
            size,
            Transport::Tcp { conn: self.id, seg },
        );
        net.send_from(self.client, pkt, sim);
    }

    fn send_to_client(&self, at: NodeId, seg: TcpSegment, sim: &mut Simulator, net: &mut Network) {
        let pkt = net.make_packet(
            self.flow_id,
            self.remote,
            self.local,
            TCP_OVERHEAD_BYTES,
            Transport::Tcp { conn: self.id, seg },
        );
        net.send_from(at, pkt, sim);
    }

    fn send_syn(&mut self, sim: &mut Simulator, net: &mut Network) {
        self.send_to_server(TCP_OVERHEAD_BYTES, TcpSegment::Syn, sim, net);
        self.arm_rto(sim);
    }

    fn send_segment(&mut self, seq: u64, len: u32, retrans: bool, sim: &mut Simulator, net: &mut Network) {
        net.viz_tcp_send_data(sim.now(), self.id, seq, len, retrans);
        if retrans {
            self.retransmits += 1;
            // Karn: no samples from retransmitted data.
            self.timing = None;
        }
        self.send_to_server(len + TCP_OVERHEAD_BYTES, TcpSegment::Data { seq, len }, sim, net);
    }

    /// 窗口允许时发送新数据
    fn send_data(&mut self, sim: &mut Simulator, net: &mut Network) {
        if self.state != TcpState::Established {
            return;
        }
        self.fill_send_buffer();
        let mss = u64::from(self.cfg.mss);
        let window = self.cwnd_bytes.min(self.cfg.rwnd_bytes);
        loop {
            let flight = self.next_seq - self.last_acked;
            let avail = window.saturating_sub(flight);
            let want = mss.min(self.written.saturating_sub(self.next_seq));
            if want == 0 || avail < want {
                break;
            }
            let seq = self.next_seq;
            let len = want as u32;
            self.next_seq += want;
            self.inflight.insert(seq, len);
            if self.timing.is_none() {
                self.timing = Some((self.next_seq, sim.now()));
            }
            self.send_segment(seq, len, false, sim, net);
        }
        if !self.rto_armed && self.next_seq > self.last_acked {
            self.arm_rto(sim);
        }
    }

    fn retransmit_earliest(&mut self, sim: &mut Simulator, net: &mut Network) {
        if let Some((&seq, &len)) = self.inflight.iter().next() {
            self.send_segment(seq, len, true, sim, net);
        }
    }

    fn on_syn_ack(&mut self, sim: &mut Simulator, net: &mut Network) {
        if self.state != TcpState::SynSent {
            return;
        }
        let now = sim.now();
        if let Some(sent) = self.syn_sent_at.take() {
            self.on_rtt_sample(now.saturating_sub(sent));
        }
        self.disarm_rto();
        self.state = TcpState::Established;
        self.established_at = Some(now);
        info!(conn = self.id, %now, rto = %self.rto, "🤝 TCP connection established");
        self.send_data(sim, net);
    }

    fn on_ack(&mut self, ack: u64, sim: &mut Simulator, net: &mut Network) {
        if self.state != TcpState::Established {
            return;
        }
        let now = sim.now();
        net.viz_tcp_recv_ack(now, self.id, ack);
        let mss = u64::from(self.cfg.mss);

        if ack > self.last_acked {
            if let Some((end, sent)) = self.timing {
                if ack >= end {
                    self.on_rtt_sample(now.saturating_sub(sent));
                    self.timing = None;
                }
            }
            let newly_acked = ack - self.last_acked;
            self.last_acked = ack;
            self.next_seq = self.next_seq.max(ack);
            self.dup_acks = 0;
            self.inflight.retain(|&seq, len| seq + u64::from(*len) > ack);

            match self.recover {
                Some(recover) if ack < recover => {
                    // Partial ACK: the next hole is lost too.
                    self.cwnd_bytes = self.cwnd_bytes.saturating_sub(newly_acked).saturating_add(mss);
                    self.retransmit_earliest(sim, net);
                }
                Some(_) => {
                    self.cwnd_bytes = self.ssthresh_bytes;
                    self.recover = None;
                }
                None if self.cwnd_bytes < self.ssthresh_bytes => {
                    self.cwnd_bytes = self.cwnd_bytes.saturating_add(newly_acked.min(mss));
                }
                None => {
                    // AIMD：每个 ACK 让 cwnd 以 mss^2/cwnd 增长（至少 +1）
                    let inc = (mss.saturating_mul(mss) / self.cwnd_bytes.max(1)).max(1);
                    self.cwnd_bytes = self.cwnd_bytes.saturating_add(inc);
                }
            }

            if self.last_acked >= self.limit() {
                self.state = TcpState::Done;
                self.done_at = Some(now);
                self.disarm_rto();
                info!(conn = self.id, %now, bytes = self.last_acked, "🏁 TCP transfer complete");
                return;
            }
            if self.next_seq > self.last_acked {
                self.arm_rto(sim);
            } else {
                self.disarm_rto();
            }
            self.send_data(sim, net);
        } else if ack == self.last_acked && self.next_seq > self.last_acked {
            self.dup_acks += 1;
            if self.dup_acks == 3 && self.recover.is_none() {
                let flight = self.next_seq - self.last_acked;
                self.ssthresh_bytes = (flight / 2).max(2 * mss);
                self.cwnd_bytes = self.ssthresh_bytes.saturating_add(3 * mss);
                self.recover = Some(self.next_seq);
                debug!(conn = self.id, seq = self.last_acked, "🔁 fast retransmit");
                self.retransmit_earliest(sim, net);
            } else if self.dup_acks > 3 || self.recover.is_some() {
                self.cwnd_bytes = self.cwnd_bytes.saturating_add(mss);
                self.send_data(sim, net);
            }
        }
    }

    fn on_rto(&mut self, sim: &mut Simulator, net: &mut Network) {
        let now = sim.now();
        self.timeouts += 1;
        self.rto = SimTime(self.rto.0.saturating_mul(2)).min(self.cfg.max_rto);
        match self.state {
            TcpState::SynSent => {
                self.syn_sent_at = None;
                debug!(conn = self.id, %now, rto = %self.rto, "⏰ SYN timeout");
                net.viz_tcp_rto(now, self.id, 0);
                self.send_syn(sim, net);
            }
            TcpState::Established => {
                let seq = self.last_acked;
                warn!(conn = self.id, %now, seq, rto = %self.rto, "⏰ retransmission timeout");
                net.viz_tcp_rto(now, self.id, seq);
                // 超时：回到慢启动，从最早未确认处重发
                let mss = u64::from(self.cfg.mss);
                let flight = self.next_seq - self.last_acked;
                self.ssthresh_bytes = (flight / 2).max(2 * mss);
                self.cwnd_bytes = mss;
                self.dup_acks = 0;
                self.recover = None;
                self.timing = None;
                self.inflight.clear();
                self.next_seq = self.last_acked;
                self.rto_armed = false;

                let len = mss.min(self.written.saturating_sub(self.next_seq)) as u32;
                if len > 0 {
                    self.next_seq += u64::from(len);
                    self.inflight.insert(seq, len);
                    self.send_segment(seq, len, true, sim, net);
                    self.arm_rto(sim);
                }
            }
            TcpState::Done | TcpState::Stopped => {}
        }
    }

    /// Receiver side. Returns false when the sink has gone away.
    fn on_data(
        &mut self,
        at: NodeId,
        seq: u64,
        len: u32,
        sim: &mut Simulator,
        net: &mut Network,
        apps: &mut Applications,
    ) -> bool {
        let Some(sink) = self.sink.filter(|s| apps.is_running(*s)) else {
            return false;
        };
        let end = seq + u64::from(len);
        let before = self.rcv_nxt;
        if seq <= self.rcv_nxt && end > self.rcv_nxt {
            self.rcv_nxt = end;
            while let Some((&s, &l)) = self.ooo.first_key_value() {
                if s > self.rcv_nxt {
                    break;
                }
                self.ooo.remove(&s);
                self.rcv_nxt = self.rcv_nxt.max(s + u64::from(l));
            }
        } else if seq > self.rcv_nxt {
            let slot = self.ooo.entry(seq).or_insert(len);
            *slot = (*slot).max(len);
        }

        let now = sim.now();
        let delivered = self.rcv_nxt - before;
        if delivered > 0 {
            apps.on_stream_data(sink, delivered, now);
        }
        net.viz_tcp_send_ack(now, self.id, self.rcv_nxt);
        self.send_to_client(at, TcpSegment::Ack { ack: self.rcv_nxt }, sim, net);
        true
    }
}

/// TCP 栈：所有连接
#[derive(Debug, Default)]
pub struct TcpStack {
    cfg: TcpConfig,
    conns: BTreeMap<TcpConnId, TcpConn>,
    last_id: TcpConnId,
}

impl TcpStack {
    pub fn config(&self) -> &TcpConfig {
        &self.cfg
    }

    /// Applies to connections opened afterwards.
    pub fn set_config(&mut self, cfg: TcpConfig) {
        self.cfg = cfg;
    }

    pub fn get(&self, id: TcpConnId) -> Option<&TcpConn> {
        self.conns.get(&id)
    }

    pub fn conns(&self) -> impl Iterator<Item = &TcpConn> + '_ {
        self.conns.values()
    }

    pub fn len(&self) -> usize {
        self.conns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.conns.is_empty()
    }

    /// 打开连接并发送 SYN
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn connect(
        &mut self,
        client: NodeId,
        local: Endpoint,
        remote: Endpoint,
        flow_id: u64,
        max_bytes: u64,
        send_size: u64,
        sim: &mut Simulator,
        net: &mut Network,
    ) -> TcpConnId {
        self.last_id += 1;
        let id = self.last_id;
        let now = sim.now();
        let mut conn = TcpConn::new(
            id,
            flow_id,
            self.cfg.clone(),
            client,
            local,
            remote,
            max_bytes,
            send_size,
            now,
        );
        info!(conn = id, %client, remote = %remote.0, port = remote.1, %now, "🔌 TCP connect");
        conn.syn_sent_at = Some(now);
        conn.send_syn(sim, net);
        self.conns.insert(id, conn);
        id
    }

    pub(crate) fn close(&mut self, id: TcpConnId) {
        if let Some(conn) = self.conns.get_mut(&id) {
            if conn.is_active() {
                conn.state = TcpState::Stopped;
                conn.disarm_rto();
                debug!(conn = id, acked = conn.last_acked, "TCP connection closed by application");
            }
        }
    }

    /// 处理送达 `at` 的 TCP 段。Returns false when nobody is listening.
    pub(crate) fn on_segment(
        &mut self,
        at: NodeId,
        pkt: &Packet,
        sim: &mut Simulator,
        net: &mut Network,
        apps: &mut Applications,
    ) -> bool {
        let Transport::Tcp { conn: id, seg } = pkt.transport else {
            return false;
        };
        let Some(conn) = self.conns.get_mut(&id) else {
            return false;
        };
        match seg {
            TcpSegment::Syn => {
                let Some(sink) = apps.listening(at, IpProtocol::Tcp, pkt.dst_port) else {
                    debug!(conn = id, node = %at, port = pkt.dst_port, "SYN to closed port");
                    return false;
                };
                conn.server = Some(at);
                conn.sink = Some(sink);
                conn.send_to_client(at, TcpSegment::SynAck, sim, net);
                true
            }
            TcpSegment::SynAck => {
                if at == conn.client {
                    conn.on_syn_ack(sim, net);
                }
                true
            }
            TcpSegment::Data { seq, len } => {
                if conn.server != Some(at) {
                    return false;
                }
                conn.on_data(at, seq, len, sim, net, apps)
            }
            TcpSegment::Ack { ack } => {
                if at == conn.client {
                    conn.on_ack(ack, sim, net);
                }
                true
            }
        }
    }

    fn on_rto(&mut self, id: TcpConnId, generation: u64, sim: &mut Simulator, net: &mut Network) {
        let Some(conn) = self.conns.get_mut(&id) else {
            return;
        };
        if !conn.rto_armed || conn.rto_gen != generation || !conn.is_active() {
            return;
        }
        conn.rto_armed = false;
        conn.on_rto(sim, net);
    }
}

/// TCP RTO 事件；被重新调度或取消的定时器通过代号失效
#[derive(Debug)]
pub struct TcpRto {
    pub conn_id: TcpConnId,
    pub generation: u64,
}

impl Event for TcpRto {
    fn execute(self: Box<Self>, sim: &mut Simulator, world: &mut dyn World) {
        let TcpRto { conn_id, generation } = *self;
        with_network(world, |net| {
            with_tcp_stack(net, |net, tcp, _| tcp.on_rto(conn_id, generation, sim, net))
        });
    }
}

/// Bulk 发送应用：尽可能快地经 TCP 发送 `max_bytes`（0 表示不限）
#[derive(Debug, Clone)]
pub struct BulkSend {
    pub remote: Endpoint,
    pub flow_id: u64,
    pub max_bytes: u64,
    pub send_size: u32,
    conn: Option<TcpConnId>,
}

impl BulkSend {
    pub fn new(remote: Endpoint, flow_id: u64, max_bytes: u64, send_size: u32) -> Self {
        Self {
            remote,
            flow_id,
            max_bytes,
            send_size,
            conn: None,
        }
    }

    pub fn conn(&self) -> Option<TcpConnId> {
        self.conn
    }

    pub fn bytes_acked(&self, tcp: &TcpStack) -> u64 {
        self.conn
            .and_then(|id| tcp.get(id))
            .map_or(0, TcpConn::bytes_acked)
    }

    /// The application table is already taken out of `net` here, so the
    /// stack is taken directly.
    pub(crate) fn start(&mut self, node: NodeId, local: Endpoint, sim: &mut Simulator, net: &mut Network) {
        let mut tcp = std::mem::take(&mut net.tcp);
        let id = tcp.connect(
            node,
            local,
            self.remote,
            self.flow_id,
            self.max_bytes,
            u64::from(self.send_size),
            sim,
            net,
        );
        net.tcp = tcp;
        self.conn = Some(id);
    }

    pub(crate) fn stop(&mut self, net: &mut Network) {
        if let Some(id) = self.conn {
            net.tcp.close(id);
        }
    }
}
