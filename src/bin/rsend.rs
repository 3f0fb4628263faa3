//! Sender driver: `rsend <receiver_hostname> <receiver_port> <filename_to_xfer> <bytes_to_xfer>`.
//!
//! Opens the input file, runs the setup handshake, drives the sliding-window
//! transfer, and tears the connection down. Argument parsing, hostname
//! resolution, and socket creation are thin collaborators around the
//! `rudp` library, which does the actual protocol work.

use std::fs::File;
use std::net::{ToSocketAddrs, UdpSocket};

use clap::Parser;
use tracing::{error, info};

use rudp::conn::Connection;
use rudp::endpoint::Endpoint;
use rudp::err::Error;
use rudp::sender;

#[derive(Parser, Debug)]
#[command(name = "rsend", about = "Send a prefix of a file to a receiver over a reliable UDP channel")]
struct Args {
    /// Hostname or IP address of the receiver.
    receiver_hostname: String,

    /// UDP port the receiver is listening on.
    receiver_port: u16,

    /// Path of the local file to transfer.
    filename_to_xfer: String,

    /// Number of bytes from the front of the file to transmit.
    bytes_to_xfer: u64,
}

fn main() {
    tracing_subscriber::fmt::init();

    let args = Args::parse();

    if let Err(e) = run(args) {
        error!(error = %e, "transfer failed");
        std::process::exit(1);
    }
}

fn run(args: Args) -> Result<(), Error> {
    let mut file = File::open(&args.filename_to_xfer).map_err(|e| Error::FileOpen {
        path: args.filename_to_xfer.clone(),
        source: e,
    })?;

    let available = file
        .metadata()
        .map_err(|e| Error::FileOpen {
            path: args.filename_to_xfer.clone(),
            source: e,
        })?
        .len();
    if args.bytes_to_xfer > available {
        return Err(Error::ByteCapExceeded {
            path: args.filename_to_xfer.clone(),
            requested: args.bytes_to_xfer,
            available,
        });
    }

    let peer = resolve(&args.receiver_hostname, args.receiver_port)?;
    info!(%peer, "resolved receiver address");

    let socket = UdpSocket::bind("0.0.0.0:0").map_err(|e| Error::BindFailed { port: 0, source: e })?;
    let local_port = socket.local_addr().map_err(Error::UnknownFailure)?.port();
    let endpoint = Endpoint::new(socket);

    let mut conn = Connection::new(local_port, peer);
    conn.setup_as_sender(&endpoint)?;

    sender::run(&endpoint, &mut conn, &mut file, args.bytes_to_xfer)?;

    info!("transfer complete");
    Ok(())
}

fn resolve(hostname: &str, port: u16) -> Result<std::net::SocketAddr, Error> {
    (hostname, port)
        .to_socket_addrs()
        .map_err(|e| Error::AddrResolution {
            host: hostname.to_string(),
            source: e,
        })?
        .next()
        .ok_or_else(|| Error::NoAddrFound {
            host: hostname.to_string(),
        })
}
