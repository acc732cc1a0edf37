// src/modules/axum/core.rs

use crate::common::env::CONFIG;
use crate::common::log;
use crate::modules::router::entrance::app_router;
use std::net::{IpAddr, SocketAddr};
use tokio::net::TcpListener;

// Starts the Axum web server.
pub async fn start() {
    let app = app_router();
    let port = CONFIG.port;
    let addr = format!("0.0.0.0:{}", port);

    // Bind the listener to the address.
    let listener = match TcpListener::bind(&addr).await {
        Ok(listener) => listener,
        Err(e) => {
            log::log(
                log::LogLevel::Error,
                &format!("✗ Failed to bind to address {}: {}", addr, e),
            );
            return;
        }
    };

    // Always log the localhost address first.
    log::log(
        log::LogLevel::Info,
        &format!("✓ Listening on http://localhost:{}", port),
    );

    // Get all non-loopback IP addresses.
    let all_ips: Vec<IpAddr> = get_if_addrs::get_if_addrs()
        .map(|interfaces| {
            interfaces
                .into_iter()
                .filter(|iface| !iface.addr.ip().is_loopback())
                .map(|iface| iface.addr.ip())
                .collect()
        })
        .unwrap_or_default();

    if !all_ips.is_empty() {
        // Sort the collected IPs with custom priority: home LAN ranges first,
        // tailnet-style ranges next, everything else after.
        let mut sorted_ips = all_ips;
        sorted_ips.sort_by_key(|ip| match ip {
            IpAddr::V4(ipv4) => {
                let octets = ipv4.octets();
                if octets[0] == 192 && octets[1] == 168 {
                    (0, ip.to_string())
                } else if octets[0] == 100 {
                    (1, ip.to_string())
                } else if octets[0] == 10 {
                    (2, ip.to_string())
                } else {
                    (3, ip.to_string())
                }
            }
            IpAddr::V6(_) => (4, ip.to_string()),
        });

        let display_limit = 2;
        let ips_to_display = &sorted_ips[..display_limit.min(sorted_ips.len())];
        let more_count = sorted_ips.len() - ips_to_display.len();

        for (index, ip_addr) in ips_to_display.iter().enumerate() {
            let url = match ip_addr {
                IpAddr::V4(ip) => format!("http://{}:{}", ip, port),
                IpAddr::V6(ip) => format!("http://[{}]:{}", ip, port),
            };

            let mut display_str = format!("✓ Listening on {}", url);
            if index == ips_to_display.len() - 1 && more_count > 0 {
                display_str.push_str(&format!(" +{} more", more_count));
            }

            log::log(log::LogLevel::Info, &display_str);
        }
    }

    log::log(log::LogLevel::Info, "✓ Ready to handle requests");

    // ConnectInfo feeds the per-ip rate limiter.
    if let Err(e) = axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await
    {
        log::log(log::LogLevel::Error, &format!("✗ Axum server error: {}", e));
    }
}
