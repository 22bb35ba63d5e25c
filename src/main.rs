use std::error::Error;
use std::fs::OpenOptions;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Mutex;

use anchorage::dns::{Message, class, rcode, rtype};
use anchorage::config::log_directive;
use anchorage::{Context, ResolutionResult};
use clap::Parser;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "anchorage")]
#[command(about = "Validating recursive DNS lookup", long_about = None)]
struct Args {
    /// Name to look up
    name: String,

    /// Record type (mnemonic or TYPEnnn)
    #[arg(short = 't', long = "type", default_value = "A")]
    qtype: String,

    /// Record class
    #[arg(short = 'c', long = "class", default_value = "IN")]
    qclass: String,

    /// Forward queries to this server instead of recursing (addr[@port])
    #[arg(short, long)]
    forward: Vec<String>,

    /// Trust anchor file (DS or DNSKEY records)
    #[arg(short, long)]
    anchor: Vec<PathBuf>,

    /// Stub zone as ZONE@ADDR[@PORT]
    #[arg(long)]
    stub: Vec<String>,

    /// Resolver option as key=value
    #[arg(short = 'o', long = "option")]
    options: Vec<String>,

    /// Print the full answer packet
    #[arg(short, long)]
    packet: bool,

    /// More logging; repeat for more detail
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

fn configure(context: &Context, args: &Args) -> Result<(), Box<dyn Error>> {
    for option in &args.options {
        let (key, value) = option
            .split_once('=')
            .ok_or_else(|| format!("option {option:?} is not key=value"))?;
        context.set_option(key, value)?;
    }
    for addr in &args.forward {
        context.set_forward(addr)?;
    }
    for stub in &args.stub {
        let (zone, addr) = stub
            .split_once('@')
            .ok_or_else(|| format!("stub {stub:?} is not ZONE@ADDR"))?;
        context.set_stub(zone, addr, false)?;
    }
    for path in &args.anchor {
        context.add_trust_anchor_file(path, false)?;
    }
    Ok(())
}

fn init_logging(context: &Context, verbose: u8) -> Result<(), Box<dyn Error>> {
    let config = context.config()?;
    let directive = log_directive(config.verbosity.max(verbose));
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(directive));

    match &config.logfile {
        None => tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .init(),
        Some(path) => {
            let file = OpenOptions::new().create(true).append(true).open(path)?;
            tracing_subscriber::fmt()
                .with_env_filter(filter)
                .with_ansi(false)
                .with_writer(Mutex::new(file))
                .init();
        }
    }
    Ok(())
}

fn print_result(result: &ResolutionResult, packet: bool) {
    println!("qname:     {}", result.qname.as_deref().unwrap_or("-"));
    println!("qtype:     {}", rtype::to_string(result.qtype));
    println!("qclass:    {}", class::to_string(result.qclass));
    if let Some(canonname) = &result.canonname {
        println!("canonname: {canonname}");
    }
    println!("rcode:     {}", rcode::to_str(result.rcode));
    println!("secure:    {}", result.secure);
    println!("bogus:     {}", result.bogus);
    if let Some(why) = &result.why_bogus {
        println!("why_bogus: {why}");
    }
    println!("nxdomain:  {}", result.nxdomain);
    println!("ttl:       {}", result.ttl);
    for data in result.records() {
        println!("data:      {data}");
    }

    if packet {
        if let Some(bytes) = &result.answer_packet {
            if let Ok(message) = Message::decode(bytes) {
                for record in message.answers.iter().chain(&message.authority) {
                    println!("{record}");
                }
            }
        }
    }
}

async fn run(args: Args) -> Result<bool, Box<dyn Error>> {
    let qtype = rtype::from_str(&args.qtype).ok_or_else(|| format!("unknown type {:?}", args.qtype))?;
    let qclass =
        class::from_str(&args.qclass).ok_or_else(|| format!("unknown class {:?}", args.qclass))?;

    let context = Context::new();
    configure(&context, &args)?;
    init_logging(&context, args.verbose)?;

    let result = context.resolve(&args.name, qtype, qclass).await?;
    print_result(&result, args.packet);
    Ok(!result.bogus)
}

fn main() -> ExitCode {
    let args = Args::parse();

    let rt = match tokio::runtime::Builder::new_multi_thread().enable_all().build() {
        Ok(rt) => rt,
        Err(e) => {
            eprintln!("cannot start runtime: {e}");
            return ExitCode::FAILURE;
        }
    };

    match rt.block_on(run(args)) {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::from(2),
        Err(e) => {
            eprintln!("anchorage: {e}");
            ExitCode::FAILURE
        }
    }
}
