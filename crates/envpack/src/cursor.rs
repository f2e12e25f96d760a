//! Forward-only reads over a byte slice. `None` means the slice ran out.

#[inline(always)]
pub(crate) fn take<'a>(buf: &mut &'a [u8], n: usize) -> Option<&'a [u8]> {
    if buf.len() < n {
        return None;
    }

    let (head, tail) = buf.split_at(n);
    *buf = tail;
    Some(head)
}

#[inline(always)]
pub(crate) fn byte(buf: &mut &[u8]) -> Option<u8> {
    take(buf, 1).map(|b| b[0])
}

/// Next `\n`-terminated line without its terminator.
pub(crate) fn line<'a>(buf: &mut &'a [u8]) -> Option<&'a [u8]> {
    let end = buf.iter().position(|&b| b == b'\n')?;
    let head = take(buf, end + 1)?;
    Some(&head[..end])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn take_advances_and_stops_at_end() {
        let data = [1u8, 2, 3];
        let mut p = &data[..];

        assert_eq!(take(&mut p, 2), Some(&[1u8, 2][..]));
        assert_eq!(byte(&mut p), Some(3));
        assert_eq!(byte(&mut p), None);
    }

    #[test]
    fn line_splits_on_newline() {
        let mut p = &b"#?RADIANCE\nFORMAT=x\n\nrest"[..];

        assert_eq!(line(&mut p), Some(&b"#?RADIANCE"[..]));
        assert_eq!(line(&mut p), Some(&b"FORMAT=x"[..]));
        assert_eq!(line(&mut p), Some(&b""[..]));
        assert_eq!(line(&mut p), None);
        assert_eq!(p, b"rest");
    }
}
