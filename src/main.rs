use clap::{arg,crate_version,Command};
use statichuff::{static_huff,bits_to_string};
type STDRESULT = Result<(),Box<dyn std::error::Error>>;

const RCH: &str = "unreachable was reached";

fn ok_to_overwrite(path_out: &str) -> bool {
    if let Ok(_f) = std::fs::File::open(path_out) {
        let mut ans = String::new();
        eprint!("{} exists, overwrite? (y/n) ",path_out);
        std::io::stdin().read_line(&mut ans).expect("could not read stdin");
        if ans.trim_end()=="y" || ans.trim_end()=="Y" {
            log::warn!("existing file will not be truncated");
            return true;
        }
        return false;
    }
    true
}

/// printable form of a symbol for the code table
fn show_symbol(symbol: u8) -> String {
    match symbol {
        b'\n' => "LF".to_string(),
        b'\r' => "CR".to_string(),
        b'\t' => "TAB".to_string(),
        b' ' => "SP".to_string(),
        s if s.is_ascii_graphic() => (s as char).to_string(),
        s => format!("{:#04x}",s)
    }
}

fn print_table(codec: &static_huff::StaticHuffman) {
    println!("--- CODE TABLE ---");
    for (symbol,code) in codec.code_table() {
        println!("[Freq: {:.5}] {} => {}",codec.frequency(*symbol),show_symbol(*symbol),bits_to_string(code));
    }
    println!("------------------");
    let bits = codec.encoded().len();
    println!("Message: {} byte(s)",codec.message().len());
    println!("Encoded: {} byte(s)",(bits + 7) / 8);
    println!("Naive code length: {:.3} bit/symbol",codec.naive_code_length());
    println!("Avg. code length with Huffman encoding: {:.3} bit/symbol",codec.average_code_length());
}

fn main() -> STDRESULT
{
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();
    let long_help =
"Examples:
---------
Compress:      `statichuff compress -i my_expanded -o my_compressed`
Expand:        `statichuff expand -i my_compressed -o my_expanded`
Code table:    `statichuff table -i my_expanded`";

    let mut main_cmd = Command::new("statichuff")
        .about("Compress and expand with a static Huffman code")
        .after_long_help(long_help)
        .version(crate_version!());
    main_cmd = main_cmd.subcommand(Command::new("compress")
        .arg(arg!(-i --input <PATH> "input path").required(true))
        .arg(arg!(-o --output <PATH> "output path").required(true))
        .about("compress a file"));

    main_cmd = main_cmd.subcommand(Command::new("expand")
        .arg(arg!(-i --input <PATH> "input path").required(true))
        .arg(arg!(-o --output <PATH> "output path").required(true))
        .about("expand a file"));

    main_cmd = main_cmd.subcommand(Command::new("table")
        .arg(arg!(-i --input <PATH> "input path").required(true))
        .arg(arg!(-x --expand "input is compressed"))
        .about("print frequencies and codes"));

    let matches = main_cmd.get_matches();

    if let Some(cmd) = matches.subcommand_matches("compress") {
        let path_in = cmd.get_one::<String>("input").expect(RCH);
        let path_out = cmd.get_one::<String>("output").expect(RCH);
        if !ok_to_overwrite(path_out) {
            eprintln!("abort operation");
            return Ok(());
        }
        let mut in_file = std::fs::File::open(path_in)?;
        let mut out_file = std::fs::OpenOptions::new().write(true).truncate(false).create(true).open(path_out)?;
        let (in_size,out_size) = static_huff::compress(&mut in_file,&mut out_file,&statichuff::STD_OPTIONS)?;
        out_file.set_len(out_size)?;
        eprintln!("compressed {} into {}",in_size,out_size);
    }

    if let Some(cmd) = matches.subcommand_matches("expand") {
        let path_in = cmd.get_one::<String>("input").expect(RCH);
        let path_out = cmd.get_one::<String>("output").expect(RCH);
        if !ok_to_overwrite(path_out) {
            eprintln!("abort operation");
            return Ok(());
        }
        let mut in_file = std::fs::File::open(path_in)?;
        let mut out_file = std::fs::OpenOptions::new().write(true).truncate(false).create(true).open(path_out)?;
        let (in_size,out_size) = static_huff::expand(&mut in_file,&mut out_file,&statichuff::STD_OPTIONS)?;
        out_file.set_len(out_size)?;
        eprintln!("expanded {} into {}",in_size,out_size);
    }

    if let Some(cmd) = matches.subcommand_matches("table") {
        let path_in = cmd.get_one::<String>("input").expect(RCH);
        let mut codec = static_huff::StaticHuffman::new();
        match cmd.get_flag("expand") {
            true => codec.decode_file(path_in)?,
            false => codec.encode(&std::fs::read(path_in)?)?
        }
        print_table(&codec);
    }

    Ok(())
}
