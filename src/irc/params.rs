use crate::common::Span;

/// `#channel :body`
///
/// The first `:` starts the body, which runs verbatim to the end of the frame.
/// Everything before it (minus trailing spaces and a leading `#`) is the channel.
/// Without a `:`, the whole remainder is the channel and there is no body.
#[inline(always)]
pub(super) fn parse(src: &str, pos: usize) -> (Option<Span>, Option<Span>) {
  let rest = &src[pos..];
  if rest.is_empty() {
    return (None, None);
  }

  let (middle_end, body) = match rest.find(':') {
    Some(colon) => (
      pos + colon,
      Some(Span::from(pos + colon + 1..src.len())),
    ),
    None => (src.len(), None),
  };

  let middle = src[pos..middle_end].trim_end_matches(' ');
  let mut start = pos;
  let end = pos + middle.len();
  if middle.starts_with('#') {
    start += 1;
  }

  let channel = (start < end).then(|| Span::from(start..end));
  (channel, body)
}
