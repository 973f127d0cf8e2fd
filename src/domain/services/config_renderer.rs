//! Stream Proxy Configuration Renderer
//!
//! Renders a backend directory into the stream proxy's configuration.
//! Output depends only on directory content, never on query order.

use crate::domain::entities::{BackendDirectory, BackendEndpoint, ServiceListener};
use crate::domain::value_objects::Protocol;
use std::fmt::Write;

/// Idle timeout applied to UDP sessions.
pub const UDP_PROXY_TIMEOUT: &str = "30s";

pub struct ConfigRenderer;

impl ConfigRenderer {
    /// Render one `upstream` block and one `server` block per listener.
    ///
    /// Every listener accepts IPv4 and IPv6, picks a backend by consistent
    /// hash of the client address and forwards the PROXY protocol header.
    /// UDP listeners close a session after one datagram exchange or 30s idle.
    pub fn render(directory: &BackendDirectory) -> String {
        let mut out = String::new();
        out.push_str("# Generated by nlb-control. Do not edit.\n");
        out.push_str("stream {\n");

        for (listener, endpoints) in directory.iter() {
            Self::render_upstream(&mut out, listener, endpoints.iter());
            Self::render_server(&mut out, listener);
        }

        out.push_str("}\n");
        out
    }

    fn render_upstream<'a>(
        out: &mut String,
        listener: &ServiceListener,
        endpoints: impl Iterator<Item = &'a BackendEndpoint>,
    ) {
        let _ = writeln!(out, "  upstream {} {{", listener.upstream_name());
        out.push_str("    hash $remote_addr consistent;\n");
        for endpoint in endpoints {
            let _ = writeln!(out, "    server {};", endpoint.socket_addr());
        }
        out.push_str("  }\n");
    }

    fn render_server(out: &mut String, listener: &ServiceListener) {
        let suffix = match listener.protocol {
            Protocol::Tcp => "",
            Protocol::Udp => " udp",
        };

        out.push_str("  server {\n");
        let _ = writeln!(out, "    listen {}{};", listener.port, suffix);
        let _ = writeln!(out, "    listen [::]:{}{};", listener.port, suffix);
        let _ = writeln!(out, "    proxy_pass {};", listener.upstream_name());
        out.push_str("    proxy_protocol on;\n");
        if listener.protocol == Protocol::Udp {
            out.push_str("    proxy_requests 1;\n");
            let _ = writeln!(out, "    proxy_timeout {};", UDP_PROXY_TIMEOUT);
        }
        out.push_str("  }\n");
    }
}
