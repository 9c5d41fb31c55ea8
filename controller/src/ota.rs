use std::str::FromStr;

use tracing::{info, warn};

use crate::{bus::Outlet, connector::ConnectorRequest};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OtaJobEvent {
    Activate,
    Fail,
    StartTest,
}

impl OtaJobEvent {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Activate => "activate",
            Self::Fail => "fail",
            Self::StartTest => "start_test",
        }
    }
}

impl FromStr for OtaJobEvent {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "activate" => Ok(Self::Activate),
            "fail" => Ok(Self::Fail),
            "start_test" => Ok(Self::StartTest),
            other => Err(format!("unknown ota event `{other}`")),
        }
    }
}

pub struct OtaHook {
    connector_requests: Outlet<ConnectorRequest>,
}

impl OtaHook {
    pub fn new(connector_requests: Outlet<ConnectorRequest>) -> Self {
        Self { connector_requests }
    }

    pub fn on_job_event(&self, event: OtaJobEvent) {
        info!(event = event.as_str(), "ota job event");
        match event {
            OtaJobEvent::Activate => {
                info!("ota image activating, closing broker session");
                self.connector_requests.try_send(ConnectorRequest::Shutdown);
            }
            OtaJobEvent::Fail => warn!("ota job failed"),
            OtaJobEvent::StartTest => info!("ota self-test started, accepting image"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bus::channel;

    #[test]
    fn activation_requests_connector_shutdown() {
        let (tx, mut rx) = channel("connector_requests", 4);
        let hook = OtaHook::new(tx);

        hook.on_job_event(OtaJobEvent::StartTest);
        hook.on_job_event(OtaJobEvent::Fail);
        assert_eq!(rx.try_recv(), None);

        hook.on_job_event(OtaJobEvent::Activate);
        assert_eq!(rx.try_recv(), Some(ConnectorRequest::Shutdown));
    }

    #[test]
    fn parses_query_names() {
        for event in [OtaJobEvent::Activate, OtaJobEvent::Fail, OtaJobEvent::StartTest] {
            assert_eq!(event.as_str().parse::<OtaJobEvent>(), Ok(event));
        }
        assert!("reboot".parse::<OtaJobEvent>().is_err());
    }
}
