use clap::Parser;

/// Accepted file types
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArgType {
    Apk,
    Axml,
    Arsc,
    NinePatch,
    Text,
}

/// Decode and encode Android binary resources
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Args {
    #[clap(flatten)]
    /// Path to the file to process. The file can be an APK, an Android
    /// binary-XML file, a resources.arsc file, a compiled nine-patch PNG or
    /// a text XML file to compile.
    target: Target,

    /// Write the result to this file instead of stdout
    #[arg(short, long)]
    pub output: Option<String>,

    /// resources.arsc used to name references when decoding binary XML or
    /// to bind attribute ids when compiling text XML
    #[arg(short, long)]
    pub table: Option<String>,

    /// Do not place elements on their original source lines
    #[arg(long)]
    pub no_line_opt: bool,

    /// Keep resources that fail validation instead of dropping them
    #[arg(long)]
    pub keep_broken: bool,

    /// Mark every resource of the table public (requires --res and --output)
    #[arg(long, requires = "res", requires = "output")]
    pub publicize: bool,

    /// Log decoding details to stderr
    #[arg(short, long)]
    pub verbose: bool,
}

/// Argument group to represent any file that can be processed
#[derive(Debug, clap::Args)]
#[group(required = true, multiple = false)]
struct Target {
   /// Path to an APK; its manifest is decoded
   #[arg(short, long)]
   apk: Option<String>,

   /// Path to an Android binary XML file
   #[arg(short, long)]
   xml: Option<String>,

   /// Path to resources.arsc file
   #[arg(short, long)]
   res: Option<String>,

   /// Path to a compiled nine-patch PNG
   #[arg(short, long)]
   ninepatch: Option<String>,

   /// Path to a text XML file to compile to binary XML
   #[arg(short, long)]
   compile: Option<String>,
}

pub fn parse_args() -> Args {
    Args::parse()
}

impl Args {
    fn target(&self) -> (ArgType, &str) {
        let target = &self.target;
        let candidates = [
            (ArgType::Apk, &target.apk),
            (ArgType::Axml, &target.xml),
            (ArgType::Arsc, &target.res),
            (ArgType::NinePatch, &target.ninepatch),
            (ArgType::Text, &target.compile),
        ];

        /* clap guarantees exactly one member of the group */
        candidates.into_iter()
            .find_map(|(arg_type, path)| path.as_deref().map(|p| (arg_type, p)))
            .unwrap_or((ArgType::Apk, ""))
    }

    pub fn get_arg_type(&self) -> ArgType {
        self.target().0
    }

    pub fn get_arg_path(&self) -> &str {
        self.target().1
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exactly_one_target() {
        let args = Args::try_parse_from(["apkres", "--res", "resources.arsc", "-v"]).unwrap();
        assert_eq!(args.get_arg_type(), ArgType::Arsc);
        assert_eq!(args.get_arg_path(), "resources.arsc");
        assert!(args.verbose);

        assert!(Args::try_parse_from(["apkres"]).is_err());
        assert!(Args::try_parse_from(["apkres", "--apk", "a.apk", "--xml", "b.xml"]).is_err());
    }

    #[test]
    fn publicize_needs_output() {
        assert!(Args::try_parse_from(["apkres", "--res", "r.arsc", "--publicize"]).is_err());
        let args = Args::try_parse_from(["apkres", "--res", "r.arsc", "--publicize", "-o", "out.arsc"]).unwrap();
        assert!(args.publicize);
    }
}
