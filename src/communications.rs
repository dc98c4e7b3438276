#![warn(clippy::pedantic)]

use bytes::Bytes;
use chrono::Local;
use futures::future::FutureExt;
use gethostname::gethostname;
use zeromq::prelude::*;

use super::optimizer::{AscentOptimizer, NUM_TRACKS};

use std::collections::VecDeque;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::str;
use std::time::Instant;

macro_rules! to_bytes {
    ($collection:expr) => {
        $collection.iter().flat_map(|x| x.to_le_bytes())
    };
}

/// Telemetry and remote control for the running optimizer: a PUB socket that
/// periodically publishes the ring-buffer logs as multipart frames, and a REP
/// socket serving get/set commands.
pub struct OptimizerComms {
    hostname: String,
    logs_sock: zeromq::PubSocket,
    logs_port: u16,
    command_sock: zeromq::RepSocket,
    command_port: u16,
    logs_publish_frequency_exponent: u8,
    outgoing_bytes: Vec<Bytes>,
    start_time: Instant,
}

impl OptimizerComms {
    #[must_use]
    pub fn new() -> Option<Self> {
        let hostname = gethostname().into_string().ok()?;
        let mut outgoing_bytes: Vec<Bytes> = Vec::new();
        outgoing_bytes.push(Bytes::copy_from_slice(hostname.as_bytes()));

        Some(OptimizerComms {
            hostname,
            logs_sock: zeromq::PubSocket::new(),
            logs_port: 8080,
            command_sock: zeromq::RepSocket::new(),
            command_port: 8081,
            logs_publish_frequency_exponent: 8,
            outgoing_bytes,
            start_time: Instant::now(),
        })
    }

    #[inline]
    #[must_use]
    pub fn logs_port(&self) -> u16 {
        self.logs_port
    }
    #[inline]
    #[must_use]
    pub fn command_port(&self) -> u16 {
        self.command_port
    }

    pub fn set_log_publish_frequency(&mut self, num_ticks: u32) {
        // round `num_ticks` down to the nearest power of 2
        self.logs_publish_frequency_exponent = num_ticks.checked_ilog2().unwrap_or(0) as u8;
    }

    #[inline]
    #[must_use]
    pub fn should_publish_logs(&self, tick_count: u64) -> bool {
        (tick_count & ((1 << self.logs_publish_frequency_exponent) - 1)) == 0
    }

    /// Poll the command socket without blocking; if a request is pending,
    /// route it into the optimizer and reply. Returns the handled command, if
    /// any. A panic inside the socket stack tears both sockets down and
    /// rebinds them.
    pub async fn handle_socket_request(&mut self, opt: &mut AscentOptimizer) -> Option<String> {
        let polled = catch_unwind(AssertUnwindSafe(|| self.command_sock.recv().now_or_never()));
        let cmd_msg = match polled {
            Ok(pending) => pending?.ok()?,
            Err(_) => {
                let _ = self.unbind_sockets().await;
                let _ = self.bind_sockets(self.logs_port, self.command_port).await;
                return None;
            }
        };
        let cmd = str::from_utf8(cmd_msg.get(0)?).ok()?;
        let _ = if let Ok(s) = opt.process_command(cmd.split(':')) {
            self.command_sock.send(s.into()).await
        } else {
            eprintln!("[{}] failed to process command [{}]", Local::now(), cmd);
            self.command_sock
                .send(format!("Command '{cmd}' not recognized").into())
                .await
        };
        Some(cmd.to_string())
    }

    /// Publish the current telemetry window: hostname, tick counter, elapsed
    /// seconds, objective and total-gradient logs, then per-track value and
    /// derivative logs and the convergence flags.
    /// # Errors
    /// Propagates any zeromq error in the socket send operation.
    pub async fn publish_logs(&mut self, opt: &AscentOptimizer) -> zeromq::ZmqResult<()> {
        while self.outgoing_bytes.len() < 6 + 2 * NUM_TRACKS {
            self.outgoing_bytes.push(Bytes::new());
        }
        // reuse each frame's allocation across publishes
        for (index, frame) in self.outgoing_bytes.iter_mut().enumerate() {
            macro_rules! match_arm {
                ($($new_bytes:expr),*) => {{
                    let previous_buffer = ::std::mem::replace(frame, Bytes::new());
                    let mut as_vec: Vec<u8> = previous_buffer.into();
                    as_vec.clear();
                    $(as_vec.extend($new_bytes);)*
                    *frame = Bytes::from(as_vec);
                }};
            }
            match index {
                0 => match_arm!(self.hostname.as_bytes()),
                1 => match_arm!(opt.tick_count().to_le_bytes()),
                2 => match_arm!(self.start_time.elapsed().as_secs().to_le_bytes()),
                3 => match_arm!(to_bytes!(opt.objective_log)),
                4 => match_arm!(to_bytes!(opt.gradient_log)),
                5 | 6 | 7 => match_arm!(to_bytes!(opt.value_logs[index - 5])),
                8 | 9 | 10 => match_arm!(to_bytes!(opt.derivative_logs[index - 8])),
                11 => {
                    match_arm!([
                        u8::from(opt.focus.converged()),
                        u8::from(opt.second_dispersion.converged()),
                        u8::from(opt.third_dispersion.converged()),
                        u8::from(opt.is_converged())
                    ])
                }
                _ => {}
            }
        }

        let msg: VecDeque<Bytes> = self.outgoing_bytes.iter().cloned().collect();
        self.logs_sock.send(msg.try_into().unwrap()).await
    }

    /// # Errors
    /// In case of any zmq error, aborts early and returns the error.
    pub async fn bind_sockets(
        &mut self,
        log_port: u16,
        command_port: u16,
    ) -> zeromq::ZmqResult<()> {
        self.logs_sock
            .bind(format!("tcp://0.0.0.0:{log_port}").as_str())
            .await?;
        self.logs_port = log_port;
        self.command_sock
            .bind(format!("tcp://0.0.0.0:{command_port}").as_str())
            .await?;
        self.command_port = command_port;
        Ok(())
    }

    /// # Errors
    /// In case of any zmq error, aborts early and returns the error.
    pub async fn unbind_sockets(&mut self) -> zeromq::ZmqResult<()> {
        let _ = self.logs_sock.unbind_all().await;
        let _ = self.command_sock.unbind_all().await;
        Ok(())
    }
}
