//! Unicode utilities: display width, character classes and draw checks.

mod normalize;
mod width;

pub use normalize::is_bad_draw;
pub use width::{
    CONTROL_MAP, CharClass, WidthMethod, char_class, char_width, char_width_with_method,
    is_graph, is_print, is_zero_width, set_width_method, width_method,
};
