//! Drops non-CFI lines and tombstone functions from the input stream.

/// Filters a line stream down to the `STACK CFI` lines that belong to real
/// (non-tombstone) functions.
///
/// The symbolizer emits a sentinel function at address zero for dead code
/// (see <https://bugs.llvm.org/show_bug.cgi?id=47148#c2>); this filter drops
/// every line belonging to it, from its `INIT` record up to (but not
/// including) the next `INIT` record.
pub fn filter_tombstones<'a, I>(lines: I) -> impl Iterator<Item = &'a str>
where
    I: Iterator<Item = &'a str>,
{
    let mut in_tombstone = false;
    lines.filter(move |line| {
        if !line.starts_with("STACK CFI ") {
            return false;
        }

        if line.starts_with("STACK CFI INIT 0 ") {
            in_tombstone = true;
            tracing::debug!("dropping tombstone function");
        } else if line.starts_with("STACK CFI INIT ") {
            in_tombstone = false;
        }

        !in_tombstone
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn drops_unrelated_lines() {
        let input = ["MODULE Linux arm 1234 foo", "STACK CFI INIT 100 4 .cfa: sp 0 + .ra: lr"];
        let filtered: Vec<_> = filter_tombstones(input.into_iter()).collect();
        assert_eq!(filtered, vec!["STACK CFI INIT 100 4 .cfa: sp 0 + .ra: lr"]);
    }

    #[test]
    fn drops_tombstone_block() {
        let input = [
            "STACK CFI INIT 0 10 .cfa: sp 0 + .ra: lr",
            "STACK CFI 4 .cfa: sp 4 +",
            "STACK CFI INIT 100 4 .cfa: sp 0 + .ra: lr",
            "STACK CFI 2 .cfa: sp 4 +",
        ];
        let filtered: Vec<_> = filter_tombstones(input.into_iter()).collect();
        assert_eq!(
            filtered,
            vec![
                "STACK CFI INIT 100 4 .cfa: sp 0 + .ra: lr",
                "STACK CFI 2 .cfa: sp 4 +",
            ]
        );
    }

    #[test]
    fn tombstone_at_end_of_stream_produces_nothing() {
        let input = [
            "STACK CFI INIT 100 4 .cfa: sp 0 + .ra: lr",
            "STACK CFI INIT 0 10 .cfa: sp 0 + .ra: lr",
            "STACK CFI 4 .cfa: sp 4 +",
        ];
        let filtered: Vec<_> = filter_tombstones(input.into_iter()).collect();
        assert_eq!(filtered, vec!["STACK CFI INIT 100 4 .cfa: sp 0 + .ra: lr"]);
    }
}
