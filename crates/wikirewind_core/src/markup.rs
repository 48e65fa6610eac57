//! Plain-text rendering of wikitext.
//!
//! The stripper is deliberately lossy: templates, tables, references,
//! comments and media embeds are dropped, links collapse to their labels and
//! inline formatting is removed. Bodies of `<nowiki>`, `<math>`, `<pre>` and
//! the code tags pass through untouched, and unbalanced markup never eats the
//! text after it. Anything implementing [`MarkupStripper`]
//! (including a plain closure) can be injected in its place.

const DROPPED_LINK_PREFIXES: &[&str] = &["file:", "image:", "media:", "category:"];
const EXTERNAL_LINK_SCHEMES: &[&str] = &["http://", "https://", "//", "ftp://", "mailto:"];
const MAGIC_WORDS: &[&str] = &[
    "__NOTOC__",
    "__TOC__",
    "__FORCETOC__",
    "__NOEDITSECTION__",
    "__NOGALLERY__",
];
const VERBATIM_TAGS: &[&str] = &["nowiki", "math", "pre", "syntaxhighlight", "source", "code"];
const KNOWN_TAGS: &[&str] = &[
    "abbr", "b", "big", "blockquote", "br", "center", "ce", "chem", "cite", "dd", "del", "div",
    "dl", "dt", "em", "font", "gallery", "h1", "h2", "h3", "h4", "h5", "h6", "hr", "i",
    "imagemap", "includeonly", "ins", "kbd", "li", "mapframe", "noinclude", "ol", "onlyinclude",
    "p", "poem", "q", "ref", "references", "s", "samp", "score", "section", "small", "span",
    "strike", "strong", "sub", "sup", "table", "td", "templatestyles", "th", "timeline", "tr",
    "tt", "u", "ul", "var",
];
const VERBATIM_OPEN: char = '\u{e000}';
const VERBATIM_CLOSE: char = '\u{e001}';
const ENTITIES: &[(&str, &str)] = &[
    ("&nbsp;", " "),
    ("&ndash;", "\u{2013}"),
    ("&mdash;", "\u{2014}"),
    ("&minus;", "\u{2212}"),
    ("&times;", "\u{00d7}"),
    ("&lt;", "<"),
    ("&gt;", ">"),
    ("&quot;", "\""),
    ("&#39;", "'"),
    ("&amp;", "&"),
];

pub trait MarkupStripper {
    fn strip(&self, wikitext: &str) -> String;
}

impl<F> MarkupStripper for F
where
    F: Fn(&str) -> String,
{
    fn strip(&self, wikitext: &str) -> String {
        self(wikitext)
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct WikitextStripper;

impl MarkupStripper for WikitextStripper {
    fn strip(&self, wikitext: &str) -> String {
        strip_markup(wikitext)
    }
}

pub fn strip_markup(wikitext: &str) -> String {
    let (text, verbatim) = protect_verbatim(wikitext);
    let text = remove_delimited(&text, "<!--", "-->");
    let text = remove_references(&text);
    let text = remove_nested(&text, "{{", "}}");
    let text = remove_nested(&text, "{|", "|}");
    let text = replace_links(&text);
    let text = remove_tags(&text);

    let mut lines = Vec::new();
    for line in text.lines() {
        let line = match heading_text(line) {
            Some(heading) => heading.to_string(),
            None => line.to_string(),
        };
        lines.push(remove_emphasis(&remove_magic_words(&line)));
    }
    let text = collapse_blank_lines(&unescape_entities(&lines.join("\n")));
    restore_verbatim(&text, &verbatim)
}

/// Swap the bodies of `<nowiki>`, `<math>`, `<pre>` and friends for
/// placeholders so braces, brackets and quotes inside them survive.
fn protect_verbatim(text: &str) -> (String, Vec<String>) {
    let mut output = String::with_capacity(text.len());
    let mut kept = Vec::new();
    let mut rest = text;
    while let Some((start, name)) = find_verbatim_open(rest) {
        output.push_str(&rest[..start]);
        let tag = &rest[start..];
        let Some(tag_end) = tag.find('>') else {
            output.push_str(tag);
            return (output, kept);
        };
        let body = &tag[tag_end + 1..];
        if tag[..tag_end].ends_with('/') {
            rest = body;
            continue;
        }
        let close = format!("</{name}>");
        let (inner, after) = match body.to_ascii_lowercase().find(&close) {
            Some(end) => (&body[..end], &body[end + close.len()..]),
            None => (body, ""),
        };
        output.push(VERBATIM_OPEN);
        output.push_str(&kept.len().to_string());
        output.push(VERBATIM_CLOSE);
        kept.push(inner.trim().to_string());
        rest = after;
    }
    output.push_str(rest);
    (output, kept)
}

fn restore_verbatim(text: &str, kept: &[String]) -> String {
    if kept.is_empty() {
        return text.to_string();
    }
    let mut output = String::with_capacity(text.len());
    let mut rest = text;
    while let Some(start) = rest.find(VERBATIM_OPEN) {
        output.push_str(&rest[..start]);
        let after_open = &rest[start + VERBATIM_OPEN.len_utf8()..];
        let restored = after_open.find(VERBATIM_CLOSE).and_then(|end| {
            let body = after_open[..end].parse::<usize>().ok().and_then(|index| kept.get(index))?;
            Some((body, end))
        });
        match restored {
            Some((body, end)) => {
                output.push_str(body);
                rest = &after_open[end + VERBATIM_CLOSE.len_utf8()..];
            }
            None => {
                output.push(VERBATIM_OPEN);
                rest = after_open;
            }
        }
    }
    output.push_str(rest);
    output
}

fn find_verbatim_open(text: &str) -> Option<(usize, &'static str)> {
    let lowered = text.to_ascii_lowercase();
    VERBATIM_TAGS
        .iter()
        .filter_map(|name| find_tag_open(&lowered, name).map(|index| (index, *name)))
        .min_by_key(|(index, _)| *index)
}

/// Byte offset of the first `<name` that is followed by `>`, `/` or whitespace.
fn find_tag_open(text: &str, name: &str) -> Option<usize> {
    let pattern = format!("<{name}");
    text.match_indices(&pattern).map(|(index, _)| index).find(|index| {
        text[index + pattern.len()..]
            .chars()
            .next()
            .is_some_and(|ch| ch == '>' || ch == '/' || ch.is_whitespace())
    })
}

fn remove_delimited(text: &str, open: &str, close: &str) -> String {
    let mut output = String::with_capacity(text.len());
    let mut rest = text;
    while let Some(start) = rest.find(open) {
        output.push_str(&rest[..start]);
        let body = &rest[start + open.len()..];
        match body.find(close) {
            Some(end) => rest = &body[end + close.len()..],
            None => {
                output.push_str(&rest[start..]);
                return output;
            }
        }
    }
    output.push_str(rest);
    output
}

/// Drop balanced `open`..`close` spans. An opener that is never closed is
/// kept literally and scanning resumes right after it.
fn remove_nested(text: &str, open: &str, close: &str) -> String {
    let mut output = String::with_capacity(text.len());
    let mut rest = text;
    loop {
        let (kept, unclosed_at) = remove_balanced(rest, open, close);
        output.push_str(&kept);
        match unclosed_at {
            Some(start) => {
                output.push_str(open);
                rest = &rest[start + open.len()..];
            }
            None => return output,
        }
    }
}

fn remove_balanced(text: &str, open: &str, close: &str) -> (String, Option<usize>) {
    let mut output = String::with_capacity(text.len());
    let mut depth = 0usize;
    let mut outer_start = 0usize;
    let mut index = 0usize;
    while index < text.len() {
        let rest = &text[index..];
        if rest.starts_with(open) {
            if depth == 0 {
                outer_start = index;
            }
            depth += 1;
            index += open.len();
            continue;
        }
        if depth > 0 && rest.starts_with(close) {
            depth -= 1;
            index += close.len();
            continue;
        }
        let Some(ch) = rest.chars().next() else {
            break;
        };
        if depth == 0 {
            output.push(ch);
        }
        index += ch.len_utf8();
    }
    if depth > 0 {
        (output, Some(outer_start))
    } else {
        (output, None)
    }
}

fn remove_references(text: &str) -> String {
    let mut output = String::with_capacity(text.len());
    let mut rest = text;
    while let Some(start) = find_tag_open(rest, "ref") {
        output.push_str(&rest[..start]);
        let tag = &rest[start..];
        let Some(tag_end) = tag.find('>') else {
            output.push_str(tag);
            return output;
        };
        if tag[..tag_end].ends_with('/') {
            rest = &tag[tag_end + 1..];
            continue;
        }
        let body = &tag[tag_end + 1..];
        match body.find("</ref>") {
            Some(close) => rest = &body[close + "</ref>".len()..],
            None => {
                // Unterminated: the opening tag goes with the other tags, the text stays.
                output.push_str(tag);
                return output;
            }
        }
    }
    output.push_str(rest);
    output
}

fn replace_links(text: &str) -> String {
    let mut output = String::with_capacity(text.len());
    let mut rest = text;
    while let Some(start) = rest.find('[') {
        output.push_str(&rest[..start]);
        let candidate = &rest[start..];

        if candidate.starts_with("[[") {
            match matching_link_close(candidate) {
                Some(end) => {
                    output.push_str(&wikilink_text(&candidate[2..end]));
                    rest = &candidate[end + 2..];
                }
                None => {
                    output.push_str("[[");
                    rest = &candidate[2..];
                }
            }
            continue;
        }

        let inner = &candidate[1..];
        let is_external = EXTERNAL_LINK_SCHEMES
            .iter()
            .any(|scheme| inner.starts_with(scheme));
        match inner.find(']') {
            Some(end) if is_external => {
                if let Some((_, label)) = inner[..end].split_once(' ') {
                    output.push_str(label.trim());
                }
                rest = &inner[end + 1..];
            }
            _ => {
                output.push('[');
                rest = inner;
            }
        }
    }
    output.push_str(rest);
    output
}

fn matching_link_close(text: &str) -> Option<usize> {
    let mut depth = 0usize;
    let mut index = 0usize;
    while index < text.len() {
        let rest = &text[index..];
        if rest.starts_with("[[") {
            depth += 1;
            index += 2;
            continue;
        }
        if rest.starts_with("]]") {
            depth = depth.saturating_sub(1);
            if depth == 0 {
                return Some(index);
            }
            index += 2;
            continue;
        }
        index += rest.chars().next().map_or(1, char::len_utf8);
    }
    None
}

fn wikilink_text(inner: &str) -> String {
    let (target, label) = match inner.split_once('|') {
        Some((target, label)) => (target.trim(), Some(label.trim())),
        None => (inner.trim(), None),
    };
    let lowered = target.to_lowercase();
    if DROPPED_LINK_PREFIXES
        .iter()
        .any(|prefix| lowered.starts_with(prefix))
    {
        return String::new();
    }
    match label {
        Some(label) if !label.is_empty() => replace_links(label),
        _ => target.trim_start_matches(':').to_string(),
    }
}

fn remove_tags(text: &str) -> String {
    let mut output = String::with_capacity(text.len());
    let mut rest = text;
    while let Some(start) = rest.find('<') {
        output.push_str(&rest[..start]);
        let candidate = &rest[start + 1..];
        match known_tag_len(candidate) {
            Some(end) => rest = &candidate[end..],
            None => {
                output.push('<');
                rest = candidate;
            }
        }
    }
    output.push_str(rest);
    output
}

/// Length of a known HTML-ish tag starting right after its `<`, up to and
/// including the `>`. The tag must close on the same line.
fn known_tag_len(candidate: &str) -> Option<usize> {
    let name_start = usize::from(candidate.starts_with('/'));
    let name_len = candidate[name_start..]
        .find(|ch: char| !ch.is_ascii_alphanumeric())
        .unwrap_or(candidate.len() - name_start);
    let name = candidate[name_start..name_start + name_len].to_ascii_lowercase();
    if !KNOWN_TAGS.contains(&name.as_str()) {
        return None;
    }

    let after_name = &candidate[name_start + name_len..];
    let next = after_name.chars().next()?;
    // `<b and c>` is prose; one-letter tags only count in their bare forms.
    let attributes_allowed = name.len() > 1;
    let well_formed = match next {
        '>' => true,
        '/' => after_name.starts_with("/>"),
        ch if ch.is_whitespace() => attributes_allowed,
        _ => false,
    };
    if !well_formed {
        return None;
    }

    let line_end = after_name.find('\n').unwrap_or(after_name.len());
    let end = after_name[..line_end].find('>')?;
    Some(name_start + name_len + end + 1)
}

fn heading_text(line: &str) -> Option<&str> {
    let trimmed = line.trim();
    if !trimmed.starts_with('=') || !trimmed.ends_with('=') || trimmed.len() < 3 {
        return None;
    }
    let start_equals = trimmed.chars().take_while(|ch| *ch == '=').count();
    let end_equals = trimmed.chars().rev().take_while(|ch| *ch == '=').count();
    if start_equals != end_equals || start_equals * 2 >= trimmed.len() {
        return None;
    }
    let content = trimmed[start_equals..trimmed.len() - end_equals].trim();
    if content.is_empty() {
        None
    } else {
        Some(content)
    }
}

fn remove_emphasis(line: &str) -> String {
    let mut output = String::with_capacity(line.len());
    let mut run = 0usize;
    for ch in line.chars() {
        if ch == '\'' {
            run += 1;
            continue;
        }
        if run == 1 {
            output.push('\'');
        }
        run = 0;
        output.push(ch);
    }
    if run == 1 {
        output.push('\'');
    }
    output
}

fn remove_magic_words(line: &str) -> String {
    let mut output = line.to_string();
    for word in MAGIC_WORDS {
        if output.contains(word) {
            output = output.replace(word, "");
        }
    }
    output
}

fn unescape_entities(text: &str) -> String {
    let mut output = text.to_string();
    for (entity, replacement) in ENTITIES {
        if output.contains(entity) {
            output = output.replace(entity, replacement);
        }
    }
    output
}

fn collapse_blank_lines(text: &str) -> String {
    let mut lines: Vec<&str> = Vec::new();
    let mut previous_blank = false;
    for line in text.lines() {
        let line = line.trim_end();
        let blank = line.trim().is_empty();
        if blank && previous_blank {
            continue;
        }
        lines.push(if blank { "" } else { line });
        previous_blank = blank;
    }
    lines.join("\n").trim().to_string()
}

#[cfg(test)]
mod tests {
    use super::{
        MarkupStripper, WikitextStripper, heading_text, remove_emphasis, remove_nested,
        remove_tags, replace_links, strip_markup,
    };

    #[test]
    fn links_collapse_to_labels() {
        assert_eq!(
            replace_links("See [[Alpha|A]] and [[Beta]] or [[:Category:Gamma]]"),
            "See A and Beta or Category:Gamma"
        );
        assert_eq!(
            replace_links("Visit [https://example.org the site] or [https://example.org]"),
            "Visit the site or "
        );
        assert_eq!(replace_links("a [bracket] stays"), "a [bracket] stays");
    }

    #[test]
    fn media_and_category_links_are_dropped() {
        assert_eq!(
            replace_links("[[File:Einstein.jpg|thumb|A [[physicist]]]]Text[[Category:Physicists]]"),
            "Text"
        );
    }

    #[test]
    fn nested_templates_are_removed() {
        assert_eq!(
            remove_nested("a{{Infobox|x={{nowrap|y}}}}b", "{{", "}}"),
            "ab"
        );
    }

    #[test]
    fn unclosed_template_keeps_the_text_after_it() {
        assert_eq!(
            remove_nested("a {{b {{c}} d", "{{", "}}"),
            "a {{b  d"
        );
        let plain = strip_markup("Before {{Infobox\n| a = b\n\nAfter text.");
        assert!(plain.ends_with("After text."), "{plain}");
    }

    #[test]
    fn math_bodies_are_kept_verbatim() {
        let plain = strip_markup(
            "Intro <math>\\frac{1}{{a}+b}</math> more.\n\n== Section ==\nImportant text.\n{{Reflist}}",
        );
        assert_eq!(plain, "Intro \\frac{1}{{a}+b} more.\n\nSection\nImportant text.");
    }

    #[test]
    fn nowiki_and_code_shield_markup() {
        assert_eq!(
            strip_markup("Type <nowiki>[[not a link]]</nowiki> or <code>{{tl|x}}</code>.<nowiki/>"),
            "Type [[not a link]] or {{tl|x}}."
        );
        assert_eq!(strip_markup("<PRE>''kept''</PRE>"), "''kept''");
    }

    #[test]
    fn unterminated_reference_keeps_following_text() {
        assert_eq!(
            strip_markup("Lead.<ref name=x>cite\n\n== Body ==\nImportant text."),
            "Lead.cite\n\nBody\nImportant text."
        );
        assert_eq!(strip_markup("Open <!-- never closed"), "Open <!-- never closed");
    }

    #[test]
    fn only_known_tags_on_one_line_are_removed() {
        assert_eq!(remove_tags("x <b>bold</b> and a<b and c>d"), "x bold and a<b and c>d");
        assert_eq!(remove_tags("<span class=\"x\">s</span><br/>"), "s");
        assert_eq!(remove_tags("if x <div\nthen y > z"), "if x <div\nthen y > z");
        assert_eq!(remove_tags("n<m but p>q"), "n<m but p>q");
    }

    #[test]
    fn headings_and_emphasis_are_flattened() {
        assert_eq!(heading_text("== Early life =="), Some("Early life"));
        assert_eq!(heading_text("=="), None);
        assert_eq!(heading_text("a == b"), None);
        assert_eq!(
            remove_emphasis("'''Albert''' was ''very'' Einstein's"),
            "Albert was very Einstein's"
        );
    }

    #[test]
    fn strip_markup_produces_plain_text() {
        let wikitext = r#"{{Short description|German physicist}}
{{Infobox scientist
| name = Albert Einstein
}}
'''Albert Einstein'''<ref name="a">{{cite book|title=X}}</ref> was a [[Germany|German]]-born [[theoretical physicist]].<ref name="b" /> <!-- hidden -->

{| class="wikitable"
|-
| cell
|}


== Life ==
He lived &ndash; mostly<br /> in [[Bern]].
__NOTOC__"#;

        let plain = strip_markup(wikitext);
        assert_eq!(
            plain,
            "Albert Einstein was a German-born theoretical physicist.\n\nLife\nHe lived \u{2013} mostly in Bern."
        );
    }

    #[test]
    fn closures_can_stand_in_for_the_stripper() {
        let upper = |text: &str| text.to_uppercase();
        assert_eq!(upper.strip("abc"), "ABC");
        assert_eq!(WikitextStripper.strip("[[a|b]]"), "b");
    }
}
