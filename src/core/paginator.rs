/// One page of an ordered sequence.
#[derive(Debug, Clone)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub number: usize,
    pub num_pages: usize,
    pub total: usize,
}

impl<T> Page<T> {
    pub fn has_next(&self) -> bool {
        self.number < self.num_pages
    }

    pub fn has_previous(&self) -> bool {
        self.number > 1
    }

    pub fn next_page_number(&self) -> Option<usize> {
        self.has_next().then(|| self.number + 1)
    }

    pub fn previous_page_number(&self) -> Option<usize> {
        self.has_previous().then(|| self.number - 1)
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

/// Slices `items` into the requested page.
///
/// `requested` is the raw `page` query value. Missing or non-numeric values
/// give page 1, out-of-range numbers clamp to the first or last page. An empty
/// sequence still has one (empty) page.
pub fn paginate<T>(items: Vec<T>, per_page: usize, requested: Option<&str>) -> Page<T> {
    let per_page = per_page.max(1);
    let total = items.len();
    let num_pages = total.div_ceil(per_page).max(1);

    let number = requested
        .and_then(|raw| raw.trim().parse::<i64>().ok())
        .map(|n| n.clamp(1, num_pages as i64) as usize)
        .unwrap_or(1);

    let start = (number - 1) * per_page;
    let items = items.into_iter().skip(start).take(per_page).collect();

    Page {
        items,
        number,
        num_pages,
        total,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn numbers(n: usize) -> Vec<usize> {
        (1..=n).collect()
    }

    #[test]
    fn thirteen_items_split_ten_and_three() {
        let first = paginate(numbers(13), 10, None);
        assert_eq!(first.len(), 10);
        assert_eq!(first.num_pages, 2);
        assert!(first.has_next());
        assert!(!first.has_previous());

        let second = paginate(numbers(13), 10, Some("2"));
        assert_eq!(second.items, vec![11, 12, 13]);
        assert!(!second.has_next());
        assert_eq!(second.previous_page_number(), Some(1));
    }

    #[test]
    fn out_of_range_pages_clamp() {
        assert_eq!(paginate(numbers(13), 10, Some("99")).number, 2);
        assert_eq!(paginate(numbers(13), 10, Some("0")).number, 1);
        assert_eq!(paginate(numbers(13), 10, Some("-4")).number, 1);
        assert_eq!(paginate(numbers(13), 10, Some("abc")).number, 1);
    }

    #[test]
    fn empty_sequence_has_one_empty_page() {
        let page = paginate(Vec::<u8>::new(), 10, Some("3"));
        assert_eq!(page.number, 1);
        assert_eq!(page.num_pages, 1);
        assert!(page.is_empty());
        assert!(!page.has_next());
    }
}
