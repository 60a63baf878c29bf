use clap::{Parser, ValueEnum};
use std::path::PathBuf;

/// package-runtime - 包组合检查工具
#[derive(Parser, Debug)]
#[command(name = "package-runtime")]
#[command(about = "检查一组包的元数据能否组合：接口解析、依赖环、构造顺序")]
pub struct Args {
    /// 子命令
    #[command(subcommand)]
    pub command: Command,

    /// 运行时配置文件（默认 ~/.config/package-runtime/config.toml）
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,
}

#[derive(Parser, Debug)]
pub enum Command {
    /// 试运行组合并报告构造顺序与诊断
    Check {
        /// 部署清单
        manifest: PathBuf,
        /// 输出格式
        #[arg(long, value_enum, default_value_t = OutputFormat::Text)]
        format: OutputFormat,
        /// 任何诊断都视为失败
        #[arg(long)]
        strict: bool,
    },
    /// 打印接口索引
    Index {
        /// 部署清单
        manifest: PathBuf,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    Text,
    Json,
}

impl Args {
    /// 解析命令行参数
    pub fn parse() -> Self {
        <Self as clap::Parser>::parse()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_check() {
        let args = <Args as clap::Parser>::parse_from([
            "package-runtime",
            "check",
            "app.toml",
            "--format",
            "json",
            "--config",
            "runtime.toml",
        ]);

        assert_eq!(args.config, Some(PathBuf::from("runtime.toml")));
        match args.command {
            Command::Check { manifest, format, strict } => {
                assert_eq!(manifest, PathBuf::from("app.toml"));
                assert_eq!(format, OutputFormat::Json);
                assert!(!strict);
            }
            other => panic!("unexpected command: {:?}", other),
        }
    }

    #[test]
    fn test_parse_index() {
        let args = <Args as clap::Parser>::parse_from(["package-runtime", "index", "app.toml"]);
        assert!(matches!(args.command, Command::Index { .. }));
    }
}
