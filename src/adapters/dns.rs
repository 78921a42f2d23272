//! Captive DNS responder for configuration mode.
//!
//! While the node hosts its configuration access point, every DNS A query
//! is answered with the node's own address so any hostname a client tries
//! resolves to the configuration interface. Runs on a plain UDP socket in
//! its own thread; stops when the [`CaptiveDns`] handle is dropped (the
//! worker notices via a stop flag on its next receive timeout).

use std::io;
use std::net::{Ipv4Addr, UdpSocket};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use log::{info, warn};

/// DNS response TTL in seconds. Short, so clients re-ask after leaving
/// configuration mode.
const ANSWER_TTL: u32 = 60;

/// Poll granularity for the stop flag.
const RECV_TIMEOUT: Duration = Duration::from_millis(500);

/// Handle to a running captive DNS responder.
pub struct CaptiveDns {
    stop: Arc<AtomicBool>,
    port: u16,
}

impl CaptiveDns {
    /// Bind and start answering. On the device this listens on the
    /// standard DNS port; on the host an ephemeral port is used so tests
    /// can run unprivileged.
    pub fn spawn(answer: Ipv4Addr) -> io::Result<Self> {
        #[cfg(target_os = "espidf")]
        let socket = UdpSocket::bind("0.0.0.0:53")?;
        #[cfg(not(target_os = "espidf"))]
        let socket = UdpSocket::bind("127.0.0.1:0")?;

        socket.set_read_timeout(Some(RECV_TIMEOUT))?;
        let port = socket.local_addr()?.port();
        let stop = Arc::new(AtomicBool::new(false));

        let stop_flag = Arc::clone(&stop);
        thread::Builder::new()
            .name("captive-dns".into())
            .spawn(move || serve(&socket, answer, &stop_flag))?;

        info!("CaptiveDns: answering all queries with {answer} (port {port})");
        Ok(Self { stop, port })
    }

    /// Port the responder is bound to.
    pub fn port(&self) -> u16 {
        self.port
    }
}

impl Drop for CaptiveDns {
    fn drop(&mut self) {
        self.stop.store(true, Ordering::SeqCst);
    }
}

fn serve(socket: &UdpSocket, answer: Ipv4Addr, stop: &AtomicBool) {
    let mut buf = [0u8; 512];
    while !stop.load(Ordering::SeqCst) {
        let (len, peer) = match socket.recv_from(&mut buf) {
            Ok(r) => r,
            Err(e)
                if e.kind() == io::ErrorKind::WouldBlock || e.kind() == io::ErrorKind::TimedOut =>
            {
                continue;
            }
            Err(e) => {
                warn!("CaptiveDns: recv failed: {e}");
                continue;
            }
        };
        if let Some(reply) = build_response(&buf[..len], answer) {
            if let Err(e) = socket.send_to(&reply, peer) {
                warn!("CaptiveDns: send failed: {e}");
            }
        }
    }
}

/// Build a response redirecting any single-question query to `answer`.
/// Returns `None` for packets too short or malformed to answer.
fn build_response(query: &[u8], answer: Ipv4Addr) -> Option<Vec<u8>> {
    // Header is 12 bytes; we need at least one question after it.
    if query.len() < 12 + 5 {
        return None;
    }
    // Responses and non-queries are ignored.
    if query[2] & 0x80 != 0 {
        return None;
    }

    // Find the end of the first question: name (length-prefixed labels,
    // 0-terminated) plus QTYPE and QCLASS.
    let mut pos = 12;
    while pos < query.len() && query[pos] != 0 {
        pos += usize::from(query[pos]) + 1;
    }
    let question_end = pos + 1 + 4;
    if question_end > query.len() {
        return None;
    }

    let mut reply = Vec::with_capacity(question_end + 16);
    // Header: same ID; QR=1, AA=1; RCODE=0; one question, one answer.
    reply.extend_from_slice(&query[0..2]);
    reply.extend_from_slice(&[0x84, 0x00]);
    reply.extend_from_slice(&[0x00, 0x01]); // QDCOUNT
    reply.extend_from_slice(&[0x00, 0x01]); // ANCOUNT
    reply.extend_from_slice(&[0x00, 0x00]); // NSCOUNT
    reply.extend_from_slice(&[0x00, 0x00]); // ARCOUNT
    // Echo the question.
    reply.extend_from_slice(&query[12..question_end]);
    // Answer: pointer to the question name, type A, class IN.
    reply.extend_from_slice(&[0xC0, 0x0C]);
    reply.extend_from_slice(&[0x00, 0x01, 0x00, 0x01]);
    reply.extend_from_slice(&ANSWER_TTL.to_be_bytes());
    reply.extend_from_slice(&[0x00, 0x04]);
    reply.extend_from_slice(&answer.octets());
    Some(reply)
}
