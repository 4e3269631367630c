//! Filter command - show the program a connection installs

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Args, ValueEnum};
use linkpacket_core::filter::{FilterBuilder, RawInstruction};
use linkpacket_core::EtherType;

use super::load_config;

/// Filter command arguments
#[derive(Args, Debug)]
pub struct FilterArgs {
    /// EtherType the program accepts
    #[arg(short, long)]
    pub protocol: EtherType,

    /// Interface MTU used as the accept length when no user filter is set
    #[arg(short, long)]
    pub mtu: Option<u32>,

    /// Output format
    #[arg(short, long, value_enum, default_value = "asm")]
    pub format: FilterFormat,
}

/// How the program is printed
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum FilterFormat {
    /// Numbered mnemonics, like `tcpdump -d`
    Asm,
    /// C initializers, like `tcpdump -dd`
    C,
    /// JSON array of instructions
    Json,
}

/// Execute the filter command
///
/// The filter from `--config`, if any, is appended after the protocol check.
pub fn execute(args: FilterArgs, config_path: Option<PathBuf>) -> Result<()> {
    let config = load_config(config_path.as_deref())?;

    let mut builder = FilterBuilder::new(args.protocol).append(&config.filter);
    if let Some(mtu) = args.mtu {
        builder = builder.mtu(mtu);
    }
    let program = builder.build().context("Failed to assemble filter")?;

    print!("{}", render(&program, args.format)?);
    Ok(())
}

fn render(program: &[RawInstruction], format: FilterFormat) -> Result<String> {
    let mut out = String::new();
    match format {
        FilterFormat::Asm => {
            for (i, ins) in program.iter().enumerate() {
                out.push_str(&format!("({i:03}) {ins}\n"));
            }
        }
        FilterFormat::C => {
            for ins in program {
                out.push_str(&format!(
                    "{{ {:#04x}, {}, {}, {:#010x} }},\n",
                    ins.op, ins.jt, ins.jf, ins.k
                ));
            }
        }
        FilterFormat::Json => {
            out = serde_json::to_string_pretty(program).context("Failed to serialize filter")?;
            out.push('\n');
        }
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ipv4_program() -> Vec<RawInstruction> {
        FilterBuilder::new(EtherType::IPV4).mtu(1500).build().unwrap()
    }

    #[test]
    fn test_render_asm() {
        let out = render(&ipv4_program(), FilterFormat::Asm).unwrap();
        let lines: Vec<&str> = out.lines().collect();
        assert_eq!(lines.len(), 4);
        assert_eq!(lines[0], "(000) ldh [12]");
        assert_eq!(lines[3], "(003) ret #1500");
    }

    #[test]
    fn test_render_c() {
        let out = render(&ipv4_program(), FilterFormat::C).unwrap();
        assert_eq!(out.lines().next(), Some("{ 0x28, 0, 0, 0x0000000c },"));
        assert_eq!(out.lines().nth(1), Some("{ 0x15, 1, 0, 0x00000800 },"));
    }

    #[test]
    fn test_render_json_parses_back() {
        let program = ipv4_program();
        let out = render(&program, FilterFormat::Json).unwrap();
        let back: Vec<RawInstruction> = serde_json::from_str(&out).unwrap();
        assert_eq!(back, program);
    }
}
