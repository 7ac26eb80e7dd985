/// Detected layout of an input file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputFormat {
	/// Delimited text with a header row, optionally gzip-compressed.
	Delimited { delimiter: u8, gzip: bool },
	Parquet,
}

impl InputFormat {
	pub fn as_str(&self) -> &'static str {
		match self {
			InputFormat::Parquet => "parquet",
			InputFormat::Delimited { delimiter, gzip } => match (delimiter, gzip) {
				(b'\t', false) => "tsv",
				(b'\t', true) => "tsv+gzip",
				(_, false) => "csv",
				(_, true) => "csv+gzip",
			},
		}
	}
}

/// Whether `peek` starts with the gzip magic bytes.
pub fn is_gzip(peek: &[u8]) -> bool {
	peek.len() >= 2 && peek[0] == 0x1f && peek[1] == 0x8b
}

/// Whether `peek` starts with the Parquet magic `PAR1`.
pub fn is_parquet(peek: &[u8]) -> bool {
	peek.starts_with(b"PAR1")
}

/// Pick the delimiter from the header line: tab if it has more tabs than commas.
pub fn detect_delimiter(peek: &[u8]) -> u8 {
	let header = peek.split(|&b| b == b'\n').next().unwrap_or(&[]);
	let tabs = header.iter().filter(|&&b| b == b'\t').count();
	let commas = header.iter().filter(|&&b| b == b',').count();
	if tabs > commas { b'\t' } else { b',' }
}
