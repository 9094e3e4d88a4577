//! Simulated device firmware on top of the in-memory bus
//!
//! Each installed device answers fetches on `config/subscribe/{id}` and pushes
//! on `config/publish/{id}` the way the real firmware does. A master answers
//! fetches for other ids on behalf of its slaves.

#![allow(dead_code)]

use agrisync::codec;
use agrisync::config::CorrelationConfig;
use agrisync::device::DeviceChannel;
use agrisync::model::DeviceConfiguration;
use agrisync::topics;
use agrisync::transport::{handler, MemoryTransport, Transport};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, Weak};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Behaviour {
    Answer,
    Fail,
    Silent,
}

#[derive(Debug, Clone)]
struct FakeDevice {
    config: DeviceConfiguration,
    fetch: Behaviour,
    push: Behaviour,
    pushes: usize,
}

type Devices = Arc<Mutex<HashMap<String, FakeDevice>>>;

pub struct FakeFleet {
    bus: Arc<MemoryTransport>,
    devices: Devices,
}

impl FakeFleet {
    pub async fn new() -> Self {
        let bus = Arc::new(MemoryTransport::new());
        bus.connect().await.unwrap();
        Self {
            bus,
            devices: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    pub fn bus(&self) -> &Arc<MemoryTransport> {
        &self.bus
    }

    pub fn channel(&self) -> Arc<DeviceChannel> {
        Arc::new(DeviceChannel::new(
            self.bus.clone(),
            CorrelationConfig::default(),
        ))
    }

    pub async fn add(&self, config: DeviceConfiguration, fetch: Behaviour, push: Behaviour) {
        let id = config.id().to_string();
        self.add_as(&id, config, fetch, push).await;
    }

    /// Installs firmware for `id` that reports `config`, whatever id it carries.
    pub async fn add_as(
        &self,
        id: &str,
        config: DeviceConfiguration,
        fetch: Behaviour,
        push: Behaviour,
    ) {
        self.devices.lock().unwrap().insert(
            id.to_string(),
            FakeDevice {
                config,
                fetch,
                push,
                pushes: 0,
            },
        );

        let weak = Arc::downgrade(&self.bus);
        let devices = self.devices.clone();
        let own_id = id.to_string();
        self.bus
            .subscribe(
                &topics::config_fetch_topic(id),
                handler(move |topic, payload| {
                    answer_fetch(&weak, &devices, &own_id, topic, payload)
                }),
            )
            .await
            .unwrap();

        let weak = Arc::downgrade(&self.bus);
        let devices = self.devices.clone();
        let own_id = id.to_string();
        self.bus
            .subscribe(
                &topics::config_push_topic(id),
                handler(move |topic, payload| {
                    answer_push(&weak, &devices, &own_id, topic, payload)
                }),
            )
            .await
            .unwrap();
    }

    pub fn config(&self, id: &str) -> DeviceConfiguration {
        self.devices.lock().unwrap()[id].config.clone()
    }

    pub fn pushes(&self, id: &str) -> usize {
        self.devices.lock().unwrap()[id].pushes
    }

    pub fn set_push(&self, id: &str, push: Behaviour) {
        if let Some(device) = self.devices.lock().unwrap().get_mut(id) {
            device.push = push;
        }
    }
}

fn reply(bus: &Weak<MemoryTransport>, topic: &str, payload: &str) {
    if let Some(bus) = bus.upgrade() {
        bus.inject(&topics::response_topic(topic), payload);
    }
}

fn answer_fetch(bus: &Weak<MemoryTransport>, devices: &Devices, own_id: &str, topic: &str, payload: &str) {
    let target = codec::from_transport_envelope(payload)
        .ok()
        .and_then(|bytes| String::from_utf8(bytes).ok())
        .unwrap_or_default();

    let answer = {
        let devices = devices.lock().unwrap();
        let behaviour = devices.get(own_id).map(|d| d.fetch);
        let lookup = if target.is_empty() { own_id } else { target.as_str() };
        match behaviour {
            Some(Behaviour::Answer) => devices
                .get(lookup)
                .map(|d| codec::encode_envelope(&d.config)),
            Some(Behaviour::Fail) => Some("FAIL".to_string()),
            _ => None,
        }
    };

    if let Some(answer) = answer {
        reply(bus, topic, &answer);
    }
}

fn answer_push(bus: &Weak<MemoryTransport>, devices: &Devices, own_id: &str, topic: &str, payload: &str) {
    let answer = {
        let mut devices = devices.lock().unwrap();
        let Some(device) = devices.get_mut(own_id) else {
            return;
        };
        device.pushes += 1;
        match device.push {
            Behaviour::Answer => match codec::decode_envelope(payload) {
                Ok(config) => {
                    device.config = config;
                    Some("OK")
                }
                Err(_) => Some("FAIL"),
            },
            Behaviour::Fail => Some("FAIL"),
            Behaviour::Silent => None,
        }
    };

    if let Some(answer) = answer {
        reply(bus, topic, answer);
    }
}

pub fn standalone(id: &str) -> DeviceConfiguration {
    let mut config = DeviceConfiguration::for_device(id);
    config.device_mode = Some(agrisync::model::DeviceMode::Master);
    config
}

pub fn master_of(id: &str, slaves: &[&str]) -> DeviceConfiguration {
    let mut config = standalone(id);
    config.slave_device_ids = slaves.iter().map(|s| s.to_string()).collect();
    config
}

pub fn slave_of(id: &str, master: &str) -> DeviceConfiguration {
    let mut config = DeviceConfiguration::for_device(id);
    config.attach_to(master);
    config
}
