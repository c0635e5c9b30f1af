//! Admin HTTP surface (SPEC_FULL §4.11, component C11, `[SUPPLEMENT]`).
//!
//! A small blocking server on `config.admin_addr`, built on `tiny_http`
//! rather than pulling in an async web framework: the rest of the crate is
//! thread-per-worker, and a one-route-per-request server needs nothing
//! heavier. Death of this thread is surfaced the same way any other fatal
//! condition is (spec §7 class 4): the caller is expected to treat a
//! returning `run` as cause to abort the process.

use std::io::Read;
use std::sync::Arc;

use tiny_http::{Method, Response, Server};

use crate::scheduler::Scheduler;

/// Serves `/stats`, `/members`, and `/reseed` until the server socket dies.
/// Returns on fatal server error; the caller decides what to do with that
/// (spec §7 class 4: an admin-surface outage is operator-visible but not, by
/// itself, cluster-destructive, so callers may choose to log and exit rather
/// than abort the whole process — left to the caller).
pub fn run(scheduler: Arc<Scheduler>) -> std::io::Result<()> {
    let server = Server::http(&scheduler.config.admin_addr)
        .map_err(|e| std::io::Error::new(std::io::ErrorKind::Other, e.to_string()))?;

    for mut request in server.incoming_requests() {
        if scheduler.is_shutdown() {
            let _ = request.respond(Response::from_string("shutting down").with_status_code(503));
            continue;
        }

        let method = request.method().clone();
        let url = request.url().to_string();

        let response = match (&method, url.as_str()) {
            (Method::Get, "/stats") => json_response(&scheduler.stats.snapshot()),
            (Method::Get, "/members") => {
                let running: Vec<_> = scheduler.model.running_snapshot().into_values().collect();
                json_response(&running)
            }
            (Method::Post, "/reseed") => {
                let mut body = String::new();
                let _ = request.as_reader().read_to_string(&mut body);
                let this = Arc::clone(&scheduler);
                std::thread::spawn(move || crate::reseed::run(this));
                Response::from_string("reseeding")
            }
            _ => Response::from_string("not found").with_status_code(404),
        };

        if let Err(e) = request.respond(response) {
            log::warn!("admin: failed to write response: {}", e);
        }
    }

    Ok(())
}

fn json_response<T: serde::Serialize>(value: &T) -> Response<std::io::Cursor<Vec<u8>>> {
    match serde_json::to_string(value) {
        Ok(body) => Response::from_string(body)
            .with_header(tiny_http::Header::from_bytes(&b"Content-Type"[..], &b"application/json"[..]).unwrap()),
        Err(e) => {
            log::error!("admin: failed to serialize response: {}", e);
            Response::from_string("internal error").with_status_code(500)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::coordination::FileCoordinationStore;
    use crate::driver::NullDriver;

    #[test]
    fn json_response_serializes_stats_snapshot() {
        let config = Config::default();
        let dir = std::env::temp_dir().join(format!("etcd-mesos-admin-test-{:?}", std::thread::current().id()));
        let coord = Arc::new(FileCoordinationStore::new(dir));
        let sched = Scheduler::new(config, Arc::new(NullDriver), coord);
        let snapshot = sched.stats.snapshot();
        let resp = json_response(&snapshot);
        assert_eq!(resp.status_code().0, 200);
    }
}
