//! Receiver driver: `rrecv <udp_port> <filename_to_write>`.
//!
//! Opens the output file, binds a UDP socket on the given port, then loops
//! receiving until a FIN has been handled and the final flush written.

use std::fs::File;
use std::net::UdpSocket;

use clap::Parser;
use tracing::{error, info};

use rudp::conn::Connection;
use rudp::endpoint::Endpoint;
use rudp::err::Error;
use rudp::receiver;

#[derive(Parser, Debug)]
#[command(name = "rrecv", about = "Receive a file over a reliable UDP channel and write it to disk")]
struct Args {
    /// UDP port to listen on.
    udp_port: u16,

    /// Path of the local file to write the received bytes to.
    filename_to_write: String,
}

fn main() {
    tracing_subscriber::fmt::init();

    let args = Args::parse();

    if let Err(e) = run(args) {
        error!(error = %e, "receive failed");
        std::process::exit(1);
    }
}

fn run(args: Args) -> Result<(), Error> {
    let mut file = File::create(&args.filename_to_write).map_err(|e| Error::FileOpen {
        path: args.filename_to_write.clone(),
        source: e,
    })?;

    let socket = UdpSocket::bind(("0.0.0.0", args.udp_port)).map_err(|e| Error::BindFailed {
        port: args.udp_port,
        source: e,
    })?;
    info!(port = args.udp_port, "bound, waiting for sender");
    let endpoint = Endpoint::new(socket);

    // The peer address is unknown until the first SYN arrives; `accept_setup`
    // inside `receiver::run` fills it in from the incoming datagram.
    let mut conn = Connection::new(args.udp_port, "0.0.0.0:0".parse().unwrap());

    receiver::run(&endpoint, &mut conn, &mut file)?;

    info!("connection closed");
    Ok(())
}
