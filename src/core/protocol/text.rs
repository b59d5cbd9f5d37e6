//! Text layout for the lens display: wrapping, paging and packet splitting.

/// Characters per display line
pub const LINE_WIDTH: usize = 40;

/// Lines per display page
pub const LINES_PER_PAGE: usize = 5;

/// Split text into display lines.
///
/// Paragraphs are separated by newlines; blank paragraphs are dropped. Each
/// paragraph is wrapped greedily at the last space inside the first
/// [`LINE_WIDTH`] characters, or hard-broken at [`LINE_WIDTH`] when a word is
/// longer than a line.
pub fn format_text_lines(text: &str) -> Vec<String> {
    let mut lines = Vec::new();

    for paragraph in text.split('\n').map(str::trim).filter(|p| !p.is_empty()) {
        let mut rest: Vec<char> = paragraph.chars().collect();

        while rest.len() > LINE_WIDTH {
            let split = rest[..LINE_WIDTH]
                .iter()
                .rposition(|c| *c == ' ')
                .filter(|idx| *idx > 0)
                .unwrap_or(LINE_WIDTH);

            lines.push(rest[..split].iter().collect());
            let remainder: String = rest[split..].iter().collect();
            rest = remainder.trim().chars().collect();
        }

        if !rest.is_empty() {
            lines.push(rest.into_iter().collect());
        }
    }

    lines
}

/// Group lines into pages of [`LINES_PER_PAGE`].
///
/// A short page is centered vertically with blank lines; when the padding is
/// odd the extra blank goes below the content.
pub fn paginate(lines: &[String]) -> Vec<String> {
    lines
        .chunks(LINES_PER_PAGE)
        .map(|page| {
            let missing = LINES_PER_PAGE - page.len();
            let top = missing / 2;
            let bottom = missing - top;

            let mut padded: Vec<&str> = Vec::with_capacity(LINES_PER_PAGE);
            padded.extend(std::iter::repeat_n("", top));
            padded.extend(page.iter().map(String::as_str));
            padded.extend(std::iter::repeat_n("", bottom));
            padded.join("\n")
        })
        .collect()
}

/// Split page text into packet payloads of at most `max_len` bytes without
/// cutting a UTF-8 sequence. Always yields at least one payload.
pub fn split_packages(text: &str, max_len: usize) -> Vec<Vec<u8>> {
    let mut packages = Vec::new();
    let mut current = Vec::with_capacity(max_len);

    for ch in text.chars() {
        let mut buf = [0u8; 4];
        let encoded = ch.encode_utf8(&mut buf).as_bytes();
        if current.len() + encoded.len() > max_len && !current.is_empty() {
            packages.push(std::mem::take(&mut current));
        }
        current.extend_from_slice(encoded);
    }

    if !current.is_empty() || packages.is_empty() {
        packages.push(current);
    }
    packages
}
