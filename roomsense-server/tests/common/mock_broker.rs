use std::collections::HashMap;
use std::net::{Ipv4Addr, SocketAddr};
use std::thread;

use rumqttd::{Broker, Config, ConnectionSettings, RouterConfig, ServerSettings};

use crate::common::mock_app::free_port;

/// An in-process MQTT 3.1.1 broker on a loopback port.
pub struct MockBroker {
    pub port: u16,
}

impl MockBroker {
    pub fn start() -> Self {
        let port = free_port();

        let mut broker = Broker::new(Config {
            id: 0,
            router: RouterConfig {
                max_connections: 100,
                max_outgoing_packet_count: 200,
                max_segment_size: 104857600,
                max_segment_count: 10,
                custom_segment: None,
                initialized_filters: None,
                shared_subscriptions_strategy: Default::default(),
            },
            v4: Some(HashMap::from([(
                "1".to_string(),
                ServerSettings {
                    name: "v4-1".to_string(),
                    listen: SocketAddr::from((Ipv4Addr::LOCALHOST, port)),
                    tls: None,
                    next_connection_delay_ms: 1,
                    connections: ConnectionSettings {
                        connection_timeout_ms: 60000,
                        max_payload_size: 20480,
                        max_inflight_count: 100,
                        auth: None,
                        external_auth: None,
                        dynamic_filters: true,
                    },
                },
            )])),
            v5: None,
            ws: None,
            cluster: None,
            console: None,
            bridge: None,
            prometheus: None,
            metrics: None,
        });

        // Runs until the test process exits
        thread::spawn(move || broker.start().unwrap());

        Self { port }
    }
}
