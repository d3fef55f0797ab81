use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

/// A cluster member identified in the log (§3).
#[derive(Debug, Clone, PartialEq)]
pub struct Server {
    pub pid: i64,
    pub port: u16,
    /// connection id (e.g. `"conn123"`) -> the remote peer's listening port.
    pub connections: HashMap<String, u16>,
}

/// The parsed identity state (§3): `pid_to_server` and `port_to_server`
/// share ownership of the same `Server` entities, so a connection recorded
/// through one index is visible through the other.
#[derive(Debug, Default)]
pub struct LogFile {
    pub pid_to_server: HashMap<i64, Rc<RefCell<Server>>>,
    pub port_to_server: HashMap<u16, Rc<RefCell<Server>>>,
}

impl LogFile {
    pub fn new() -> Self {
        Self::default()
    }

    /// Install a server start record (`id == 4615611`). A later record for
    /// a port already in use supersedes the old server there; likewise for
    /// a pid already bound to a different port. Both indices are updated
    /// atomically so they never point at two different `Server`s for the
    /// same pid or port.
    pub fn install_server(&mut self, pid: i64, port: u16) {
        if let Some(superseded) = self.port_to_server.remove(&port) {
            let stale_pid = superseded.borrow().pid;
            self.pid_to_server.remove(&stale_pid);
        }

        if let Some(superseded) = self.pid_to_server.remove(&pid) {
            let stale_port = superseded.borrow().port;
            self.port_to_server.remove(&stale_port);
        }

        let server = Rc::new(RefCell::new(Server {
            pid,
            port,
            connections: HashMap::new(),
        }));

        self.pid_to_server.insert(pid, server.clone());
        self.port_to_server.insert(port, server);
    }

    /// Install a client-metadata handshake record (`id == 51800`). A no-op
    /// if either the owning server or the remote pid is unknown.
    pub fn record_connection(&mut self, owner_port: u16, connection_id: String, remote_pid: i64) {
        let Some(owner) = self.port_to_server.get(&owner_port) else {
            return;
        };
        let Some(remote) = self.pid_to_server.get(&remote_pid) else {
            return;
        };

        let remote_port = remote.borrow().port;
        owner.borrow_mut().connections.insert(connection_id, remote_port);
    }

    pub fn server_ports(&self) -> impl Iterator<Item = u16> + '_ {
        self.port_to_server.keys().copied()
    }
}
