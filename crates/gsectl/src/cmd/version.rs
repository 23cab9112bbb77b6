use gsectl_frame::{ECU_COMMAND, ECU_TELEMETRY, GSE_COMMAND, GSE_TELEMETRY};

use crate::cmd::VersionArgs;
use crate::exit::{CliResult, SUCCESS};

pub fn run(args: VersionArgs) -> CliResult<i32> {
    if !args.extended {
        println!("gsectl {}", env!("CARGO_PKG_VERSION"));
        return Ok(SUCCESS);
    }

    println!("name: gsectl");
    println!("version: {}", env!("CARGO_PKG_VERSION"));
    println!(
        "target: {}",
        option_env!("GSECTL_BUILD_TARGET").unwrap_or("unknown")
    );
    println!("target_os: {}", std::env::consts::OS);
    println!("target_arch: {}", std::env::consts::ARCH);
    println!("git_hash: {}", option_env!("GIT_HASH").unwrap_or("unknown"));
    for schema in [&GSE_TELEMETRY, &GSE_COMMAND, &ECU_TELEMETRY, &ECU_COMMAND] {
        println!(
            "frame: {} {} bytes{}",
            schema.name,
            schema.size(),
            if schema.checksum { " (crc32)" } else { "" }
        );
    }

    Ok(SUCCESS)
}
