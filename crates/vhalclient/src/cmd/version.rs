use crate::cmd::VersionArgs;
use crate::exit::{CliResult, SUCCESS};

pub fn run(args: VersionArgs) -> CliResult<i32> {
    if !args.extended {
        println!("vhalclient {}", env!("CARGO_PKG_VERSION"));
        return Ok(SUCCESS);
    }

    println!("name: vhalclient");
    println!("version: {}", env!("CARGO_PKG_VERSION"));
    println!("target_os: {}", std::env::consts::OS);
    println!("target_arch: {}", std::env::consts::ARCH);
    println!(
        "build_target: {}",
        option_env!("VHALCLIENT_BUILD_TARGET").unwrap_or("unknown")
    );
    println!(
        "rustc: {}",
        option_env!("RUSTC_VERSION").unwrap_or("unknown")
    );
    println!("git_hash: {}", option_env!("GIT_HASH").unwrap_or("unknown"));
    println!(
        "wire: control={}B little-endian, frame prefix={}B little-endian",
        vhalclient_frame::CONTROL_MESSAGE_SIZE,
        vhalclient_frame::LENGTH_PREFIX_SIZE
    );
    println!(
        "defaults: audio_port={}, retry_delay={:?}, poll_timeout={:?}",
        vhalclient_transport::DEFAULT_TCP_PORT,
        vhalclient_sink::DEFAULT_RETRY_DELAY,
        vhalclient_sink::DEFAULT_POLL_TIMEOUT
    );

    Ok(SUCCESS)
}
