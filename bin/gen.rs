use clap::{Arg, Command};
use std::io::{self, Write};

const ABN_WEIGHTS: [u32; 11] = [10, 1, 3, 5, 7, 9, 11, 13, 15, 17, 19];

/// Prefix the nine-digit `body` with the two check digits that make a valid ABN.
fn abn_from_body(body: u64) -> String {
    let body = format!("{:09}", body % 1_000_000_000);
    (10..100)
        .map(|prefix| format!("{prefix}{body}"))
        .find(|candidate| {
            let sum: u32 = candidate
                .bytes()
                .enumerate()
                .map(|(i, b)| {
                    let digit = u32::from(b - b'0');
                    let digit = if i == 0 { digit - 1 } else { digit };
                    digit * ABN_WEIGHTS[i]
                })
                .sum();
            sum % 89 == 0
        })
        .unwrap_or_else(|| format!("10{body}"))
}

fn main() -> anyhow::Result<()> {
    let matches = Command::new("gen")
        .about("Write a sample client list with ABNs to stdout")
        .arg(
            Arg::new("rows")
                .long("rows")
                .value_parser(clap::value_parser!(u64))
                .required(true),
        )
        .arg(
            Arg::new("with_header")
                .long("with-header")
                .action(clap::ArgAction::SetTrue),
        )
        .arg(
            Arg::new("spaced")
                .long("spaced")
                .help("Group ABN digits as 11 111 111 111")
                .action(clap::ArgAction::SetTrue),
        )
        .arg(Arg::new("delim").long("delim").default_value(","))
        .get_matches();

    let rows = *matches
        .get_one::<u64>("rows")
        .ok_or_else(|| anyhow::anyhow!("--rows is required"))?;
    let with_header = matches.get_flag("with_header");
    let spaced = matches.get_flag("spaced");
    let delim = matches
        .get_one::<String>("delim")
        .map(String::as_str)
        .unwrap_or(",");

    let mut out = io::BufWriter::new(io::stdout().lock());

    if with_header {
        writeln!(&mut out, "Client ID{delim}Company Name{delim}ABN{delim}Notes")?;
    }

    // Deterministic data; every third name carries the delimiter and is quoted.
    for i in 0..rows {
        let abn = abn_from_body(i.wrapping_mul(7_919).wrapping_add(100_000_007));
        let abn = if spaced {
            format!("{} {} {} {}", &abn[..2], &abn[2..5], &abn[5..8], &abn[8..])
        } else {
            abn
        };
        let name = if i % 3 == 0 {
            format!("\"Client {i}{delim} Pty Ltd\"")
        } else {
            format!("Client {i} Pty Ltd")
        };
        writeln!(&mut out, "C{i:06}{delim}{name}{delim}{abn}{delim}row {i}")?;
        if i % 10_000 == 0 {
            out.flush()?;
        }
    }

    out.flush()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generated_abns_pass_the_checksum() {
        assert_eq!(abn_from_body(824_753_556), "51824753556");
    }
}
