use std::ops::Range;

/// A run of markdown lines under one heading.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct Section {
    pub range: Range<usize>,
    /// Enclosing heading titles, outermost first (includes the section's own heading).
    pub headings: Vec<String>,
    /// Whether the section starts with a heading line.
    pub starts_with_heading: bool,
}

/// Parse an ATX heading line (`#` .. `######` followed by a space).
pub fn parse_heading(line: &str) -> Option<(usize, &str)> {
    let trimmed = line.trim_end();
    let level = trimmed.bytes().take_while(|b| *b == b'#').count();
    if level == 0 || level > 6 {
        return None;
    }
    let rest = &trimmed[level..];
    if !(rest.starts_with(' ') || rest.starts_with('\t')) {
        return None;
    }
    let title = rest.trim().trim_end_matches('#').trim_end();
    if title.is_empty() {
        None
    } else {
        Some((level, title))
    }
}

fn fence_marker(line: &str) -> Option<&'static str> {
    let t = line.trim_start();
    if t.starts_with("```") {
        Some("```")
    } else if t.starts_with("~~~") {
        Some("~~~")
    } else {
        None
    }
}

/// Heading lines of `text` outside fenced code blocks, as `(level, title)`.
pub(crate) fn heading_lines(text: &str) -> impl Iterator<Item = (usize, &str)> {
    let mut fence: Option<&'static str> = None;
    text.lines().filter_map(move |line| {
        if let Some(open) = fence {
            if fence_marker(line) == Some(open) {
                fence = None;
            }
            return None;
        }
        if let Some(marker) = fence_marker(line) {
            fence = Some(marker);
            return None;
        }
        parse_heading(line)
    })
}

/// Split markdown at heading boundaries. Lines inside fenced code blocks are
/// never treated as headings. Sections are contiguous and cover `text`;
/// whitespace-only sections are dropped.
pub(crate) fn sections(text: &str) -> Vec<Section> {
    let mut out = Vec::new();
    let mut stack: Vec<(usize, String)> = Vec::new();
    let mut current_start = 0usize;
    let mut current_has_heading = false;
    let mut fence: Option<&'static str> = None;
    let mut offset = 0usize;

    for line in text.split_inclusive('\n') {
        let line_start = offset;
        offset += line.len();

        if let Some(open) = fence {
            if fence_marker(line) == Some(open) {
                fence = None;
            }
            continue;
        }
        if let Some(marker) = fence_marker(line) {
            fence = Some(marker);
            continue;
        }
        let Some((level, title)) = parse_heading(line) else {
            continue;
        };

        push_section(&mut out, text, current_start..line_start, &stack, current_has_heading);
        while stack.last().is_some_and(|(l, _)| *l >= level) {
            stack.pop();
        }
        stack.push((level, title.to_string()));
        current_start = line_start;
        current_has_heading = true;
    }
    push_section(&mut out, text, current_start..text.len(), &stack, current_has_heading);
    out
}

fn push_section(
    out: &mut Vec<Section>,
    text: &str,
    range: Range<usize>,
    stack: &[(usize, String)],
    starts_with_heading: bool,
) {
    if text[range.clone()].trim().is_empty() {
        return;
    }
    out.push(Section {
        range,
        headings: stack.iter().map(|(_, t)| t.clone()).collect(),
        starts_with_heading,
    });
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn heading_parsing() {
        assert_eq!(parse_heading("# Orion\n"), Some((1, "Orion")));
        assert_eq!(parse_heading("### Setup ###"), Some((3, "Setup")));
        assert_eq!(parse_heading("#hashtag"), None);
        assert_eq!(parse_heading("####### too deep"), None);
        assert_eq!(parse_heading("#   "), None);
        assert_eq!(parse_heading("text # not a heading"), None);
    }

    #[test]
    fn sections_track_hierarchy() {
        let md = "intro\n# A\na body\n## B\nb body\n### C\nc\n## D\nd\n# E\ne\n";
        let secs = sections(md);
        let heads: Vec<Vec<&str>> =
            secs.iter().map(|s| s.headings.iter().map(String::as_str).collect()).collect();
        assert_eq!(
            heads,
            vec![
                vec![],
                vec!["A"],
                vec!["A", "B"],
                vec!["A", "B", "C"],
                vec!["A", "D"],
                vec!["E"],
            ]
        );
        assert!(!secs[0].starts_with_heading);
        assert!(secs[1].starts_with_heading);
        let joined: String = secs.iter().map(|s| &md[s.range.clone()]).collect();
        assert_eq!(joined, md);
    }

    #[test]
    fn headings_inside_code_fences_are_ignored() {
        let md = "# Tool\n```bash\n# install\npip install x\n```\nmore\n";
        let secs = sections(md);
        assert_eq!(secs.len(), 1);
        assert_eq!(secs[0].headings, vec!["Tool".to_string()]);
    }

    #[test]
    fn heading_lines_skip_fenced_comments() {
        let md = "# Orion Scheduler\n~~~\n# not this\n~~~\n## Usage\n```sh\n# nor this\n";
        let found: Vec<_> = heading_lines(md).collect();
        assert_eq!(found, vec![(1, "Orion Scheduler"), (2, "Usage")]);
    }

    #[test]
    fn blank_sections_are_dropped() {
        let md = "\n\n# Only\ntext\n";
        let secs = sections(md);
        assert_eq!(secs.len(), 1);
        assert_eq!(&md[secs[0].range.clone()], "# Only\ntext\n");
    }
}
