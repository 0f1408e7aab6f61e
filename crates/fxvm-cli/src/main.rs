#![forbid(unsafe_code)]

// Native-only tool; keep the workspace building for wasm32.
#[cfg(target_arch = "wasm32")]
fn main() {}

#[cfg(not(target_arch = "wasm32"))]
mod native {
    use std::fs;
    use std::path::{Path, PathBuf};

    use anyhow::{anyhow, bail, Context, Result};
    use clap::{Args, Parser, Subcommand};
    use fxvm::asm::Assembler;
    use fxvm::disasm::disassemble;
    use fxvm::format::BundleFile;
    use fxvm::{create_uav, Bundle, Dim3, Uav, VmConfig};
    use tracing::debug;

    #[derive(Debug, Parser)]
    #[command(name = "fxvm")]
    #[command(about = "Inspect, assemble and run compute bundles")]
    pub struct Cli {
        #[command(subcommand)]
        command: Commands,
    }

    #[derive(Debug, Subcommand)]
    enum Commands {
        /// List chunks, constants and externs.
        Info {
            /// Bundle file.
            bundle: PathBuf,
        },
        /// Print the instruction listing.
        Disasm {
            /// Bundle file.
            bundle: PathBuf,
        },
        /// Assemble a textual listing into a bundle (no constants or externs).
        Asm {
            /// Listing in `fxvm disasm` syntax.
            input: PathBuf,

            /// Output bundle path.
            #[arg(short, long)]
            output: PathBuf,
        },
        /// Play a bundle once, or dispatch it over a grid.
        Run(RunArgs),
    }

    #[derive(Debug, Args)]
    struct RunArgs {
        /// Bundle file.
        bundle: PathBuf,

        /// Bind a zeroed UAV: `name:element_size:length:register`.
        #[arg(long = "uav", value_name = "SPEC", value_parser = parse_uav_spec)]
        uavs: Vec<UavSpec>,

        /// Set a constant: `name=kind:value` with kind `int`, `uint`, `float` or `float3`.
        #[arg(long = "set", value_name = "ASSIGN", value_parser = parse_assignment)]
        sets: Vec<Assignment>,

        /// Thread groups to dispatch (`x,y,z`). Without this the bundle is played once.
        #[arg(long, value_name = "X,Y,Z", value_parser = parse_dim3)]
        groups: Option<Dim3>,

        /// Threads per group (`x,y,z`).
        #[arg(long, value_name = "X,Y,Z", value_parser = parse_dim3, default_value = "1,1,1", requires = "groups")]
        threads: Dim3,

        /// Print a hex minidump of each UAV afterwards.
        #[arg(long)]
        dump: bool,

        /// Register file size in words (overrides `FXVM_REGISTER_COUNT`).
        #[arg(long)]
        registers: Option<usize>,
    }

    #[derive(Debug, Clone, PartialEq, Eq)]
    pub(crate) struct UavSpec {
        pub name: String,
        pub element_size: u32,
        pub length: u32,
        pub register: u32,
    }

    #[derive(Debug, Clone, PartialEq)]
    pub(crate) struct Assignment {
        pub name: String,
        pub bytes: Vec<u8>,
    }

    pub(crate) fn parse_uav_spec(s: &str) -> Result<UavSpec, String> {
        let parts: Vec<&str> = s.split(':').collect();
        let [name, element_size, length, register] = parts[..] else {
            return Err(format!("expected name:element_size:length:register, got {s:?}"));
        };
        let num = |field: &str, v: &str| {
            v.trim()
                .parse::<u32>()
                .map_err(|e| format!("invalid {field} {v:?}: {e}"))
        };
        Ok(UavSpec {
            name: name.to_owned(),
            element_size: num("element size", element_size)?,
            length: num("length", length)?,
            register: num("register", register.trim_start_matches('u'))?,
        })
    }

    pub(crate) fn parse_assignment(s: &str) -> Result<Assignment, String> {
        let (name, typed) = s
            .split_once('=')
            .ok_or_else(|| format!("expected name=kind:value, got {s:?}"))?;
        let (kind, value) = typed
            .split_once(':')
            .ok_or_else(|| format!("expected kind:value after '=', got {typed:?}"))?;

        let bad = |e: &dyn std::fmt::Display| format!("invalid {kind} value {value:?}: {e}");
        let bytes = match kind {
            "int" => value.parse::<i32>().map_err(|e| bad(&e))?.to_le_bytes().to_vec(),
            "uint" => value.parse::<u32>().map_err(|e| bad(&e))?.to_le_bytes().to_vec(),
            "float" => value.parse::<f32>().map_err(|e| bad(&e))?.to_le_bytes().to_vec(),
            "float3" => {
                let mut out = Vec::with_capacity(12);
                let comps: Vec<&str> = value.split(',').collect();
                if comps.len() != 3 {
                    return Err(bad(&"expected three comma-separated components"));
                }
                for c in comps {
                    let f = c.trim().parse::<f32>().map_err(|e| bad(&e))?;
                    out.extend_from_slice(&f.to_le_bytes());
                }
                out
            }
            other => return Err(format!("unknown constant kind {other:?}")),
        };
        Ok(Assignment {
            name: name.to_owned(),
            bytes,
        })
    }

    pub(crate) fn parse_dim3(s: &str) -> Result<Dim3, String> {
        let comps = s
            .split(',')
            .map(|c| c.trim().parse::<u32>())
            .collect::<Result<Vec<_>, _>>()
            .map_err(|e| format!("invalid dimensions {s:?}: {e}"))?;
        match comps[..] {
            [x] => Ok(Dim3::new(x, 1, 1)),
            [x, y] => Ok(Dim3::new(x, y, 1)),
            [x, y, z] => Ok(Dim3::new(x, y, z)),
            _ => Err(format!("expected 1 to 3 dimensions, got {s:?}")),
        }
    }

    fn read_bundle(path: &Path) -> Result<Vec<u8>> {
        fs::read(path).with_context(|| format!("failed to read bundle {}", path.display()))
    }

    fn load(path: &Path, config: &VmConfig) -> Result<Bundle> {
        let bytes = read_bundle(path)?;
        Bundle::load_with_config(path.display().to_string(), &bytes, config)
            .with_context(|| format!("failed to load {}", path.display()))
    }

    fn info(path: &Path, config: &VmConfig) -> Result<()> {
        let bytes = read_bundle(path)?;
        let file = BundleFile::parse(&bytes)
            .with_context(|| format!("failed to parse {}", path.display()))?;
        println!("{}", file.debug_summary());

        let bundle = Bundle::load_with_config(path.display().to_string(), &bytes, config)?;
        println!("instructions: {}", bundle.instructions().len());
        println!("constants ({} bytes):", bundle.constants().byte_len());
        for c in bundle.layout() {
            println!(
                "  {:<24} {:<10} @{:<6} {} bytes",
                c.name, c.type_name, c.offset, c.size
            );
        }
        println!("externs:");
        for e in bundle.externs() {
            println!("  #{} {}", e.id, e.signature());
        }
        Ok(())
    }

    fn disasm(path: &Path, config: &VmConfig) -> Result<()> {
        let bundle = load(path, config)?;
        print!("{}", disassemble(bundle.instructions(), bundle.externs()));
        Ok(())
    }

    fn asm(input: &Path, output: &Path) -> Result<()> {
        let text = fs::read_to_string(input)
            .with_context(|| format!("failed to read {}", input.display()))?;
        let asm = Assembler::parse(&text).with_context(|| format!("in {}", input.display()))?;
        let bytes = asm.to_writer().finish();
        // Reject listings that would not load.
        Bundle::load("asm", &bytes).map_err(|e| anyhow!("assembled bundle is invalid: {e}"))?;
        fs::write(output, &bytes)
            .with_context(|| format!("failed to write {}", output.display()))?;
        println!(
            "wrote {} instructions ({} bytes) to {}",
            asm.instructions().len(),
            bytes.len(),
            output.display()
        );
        Ok(())
    }

    fn run(args: RunArgs, mut config: VmConfig) -> Result<()> {
        if let Some(n) = args.registers {
            config.register_count = n;
        }
        let mut bundle = load(&args.bundle, &config)?;

        for set in &args.sets {
            if !bundle.set_constant(&set.name, &set.bytes) {
                bail!("bundle has no constant named {:?}", set.name);
            }
        }

        let mut uavs: Vec<Uav> = Vec::with_capacity(args.uavs.len());
        for spec in &args.uavs {
            let uav = create_uav(&spec.name, spec.element_size, spec.length, spec.register)?;
            bundle.bind_uav(&uav)?;
            debug!(uav = %uav.name, slot = uav.index, bytes = uav.byte_len(), "bound uav");
            uavs.push(uav);
        }

        let mut regs = config.register_file();
        match args.groups {
            Some(groups) => {
                let n = bundle.dispatch(&mut regs, groups, args.threads)?;
                println!("dispatched {n} invocations");
            }
            None => {
                let ret = bundle.play(&mut regs)?;
                println!("returned {ret}");
            }
        }

        for uav in &uavs {
            println!("uav {}: counter {}", uav.name, uav.read_counter());
            if args.dump {
                println!("{}", uav.minidump());
            }
        }
        let stats = bundle.stats();
        debug!(?stats, "run complete");
        for (id, e) in bundle.externs().iter().enumerate() {
            let calls = bundle.unbound_extern_calls(id as u32);
            if calls > 0 {
                println!("unbound extern {}: {calls} calls", e.name);
            }
        }
        Ok(())
    }

    pub fn main() -> Result<()> {
        tracing_subscriber::fmt()
            .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
            .with_writer(std::io::stderr)
            .init();

        let config = VmConfig::from_env().context("invalid FXVM_* environment")?;
        let cli = Cli::parse();
        match cli.command {
            Commands::Info { bundle } => info(&bundle, &config),
            Commands::Disasm { bundle } => disasm(&bundle, &config),
            Commands::Asm { input, output } => asm(&input, &output),
            Commands::Run(args) => run(args, config),
        }
    }

}

#[cfg(not(target_arch = "wasm32"))]
fn main() -> anyhow::Result<()> {
    native::main()
}
