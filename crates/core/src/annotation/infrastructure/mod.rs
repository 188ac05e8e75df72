pub mod rect_outline_annotator;
