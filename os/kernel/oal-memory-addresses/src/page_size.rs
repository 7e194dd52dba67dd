use core::fmt;
use core::hash::Hash;

mod sealed {
    pub trait Sealed {}
}

/// Page granularity of a managed memory region.
///
/// Reserved regions are carved into pages of one of these sizes. The marker
/// is carried at the type level so page counts and byte sizes never mix.
pub trait PageSize:
    sealed::Sealed + Clone + Copy + Eq + Ord + Hash + Default + fmt::Display + fmt::Debug
{
    /// Page size in bytes (power of two).
    const SIZE: u64;
    /// log2(SIZE).
    const SHIFT: u32;

    fn as_str() -> &'static str;
}

macro_rules! page_size {
    ($(#[$doc:meta])* $name:ident, $shift:literal, $label:literal) => {
        $(#[$doc])*
        #[derive(Copy, Clone, Default, Eq, PartialEq, Ord, PartialOrd, Hash)]
        pub struct $name;

        impl sealed::Sealed for $name {}

        impl PageSize for $name {
            const SIZE: u64 = 1 << $shift;
            const SHIFT: u32 = $shift;

            fn as_str() -> &'static str {
                $label
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(Self::as_str())
            }
        }

        impl fmt::Debug for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                fmt::Display::fmt(self, f)
            }
        }
    };
}

page_size!(
    /// 4 KiB pages, the default granularity.
    Size4K, 12, "4K"
);
page_size!(
    /// 16 KiB pages.
    Size16K, 14, "16K"
);
page_size!(
    /// 64 KiB pages.
    Size64K, 16, "64K"
);

const _: () = {
    assert!(Size4K::SIZE == 4096);
    assert!(Size16K::SIZE == 16 * 1024);
    assert!(Size64K::SIZE == 64 * 1024);
};
