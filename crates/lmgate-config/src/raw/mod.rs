pub mod gateway;

#[macro_export]
macro_rules! fill_default {
    ($s:expr, $( $field:ident : $value:expr ),+ $(,)?) => {
        $(
            if $s.$field.is_none() {
                $s.$field = Some($value);
            }
        )+
    };
}
