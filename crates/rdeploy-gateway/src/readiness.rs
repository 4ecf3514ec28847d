//! Network readiness checks that run in-process (HTTP and TCP).

use std::time::Duration;
use tokio::net::TcpStream;
use tracing::debug;

use crate::types::ReadinessSignal;

/// GET `url`; ready when the status equals `expected_status`.
///
/// Connection failures and other statuses are `NotReady`: the service may
/// still be booting.
pub(crate) async fn probe_http(
    client: &reqwest::Client,
    url: &str,
    expected_status: u16,
    timeout: Duration,
) -> ReadinessSignal {
    match client.get(url).timeout(timeout).send().await {
        Ok(response) if response.status().as_u16() == expected_status => ReadinessSignal::Ready,
        Ok(response) => {
            debug!(url, status = response.status().as_u16(), expected_status, "HTTP probe not ready");
            ReadinessSignal::NotReady
        }
        Err(e) => {
            debug!(url, error = %e, "HTTP probe failed to connect");
            ReadinessSignal::NotReady
        }
    }
}

/// Ready when a TCP connection to `host:port` opens within `timeout`.
pub(crate) async fn probe_tcp(host: &str, port: u16, timeout: Duration) -> ReadinessSignal {
    match tokio::time::timeout(timeout, TcpStream::connect((host, port))).await {
        Ok(Ok(_stream)) => ReadinessSignal::Ready,
        Ok(Err(e)) => {
            debug!(host, port, error = %e, "TCP probe refused");
            ReadinessSignal::NotReady
        }
        Err(_) => {
            debug!(host, port, "TCP probe timed out");
            ReadinessSignal::NotReady
        }
    }
}

/// Interpret `compose exec` output for an exec probe.
pub(crate) fn exec_signal(success: bool, stdout: &str, expect_output: Option<&str>) -> ReadinessSignal {
    if !success {
        return ReadinessSignal::NotReady;
    }
    match expect_output {
        Some(expected) if !stdout.contains(expected) => ReadinessSignal::NotReady,
        _ => ReadinessSignal::Ready,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::net::TcpListener;

    #[tokio::test]
    async fn test_tcp_probe_ready_when_listening() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        let signal = probe_tcp("127.0.0.1", port, Duration::from_secs(2)).await;
        assert_eq!(signal, ReadinessSignal::Ready);
    }

    #[tokio::test]
    async fn test_tcp_probe_not_ready_when_closed() {
        let port = {
            let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
            listener.local_addr().unwrap().port()
        };
        let signal = probe_tcp("127.0.0.1", port, Duration::from_secs(2)).await;
        assert_eq!(signal, ReadinessSignal::NotReady);
    }

    #[test]
    fn test_exec_signal_requires_expected_output() {
        assert_eq!(exec_signal(true, "PONG\n", Some("PONG")), ReadinessSignal::Ready);
        assert_eq!(exec_signal(true, "LOADING\n", Some("PONG")), ReadinessSignal::NotReady);
        assert_eq!(exec_signal(false, "PONG", Some("PONG")), ReadinessSignal::NotReady);
        assert_eq!(exec_signal(true, "mysqld is alive", None), ReadinessSignal::Ready);
    }
}
