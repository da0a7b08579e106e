use leptos::prelude::*;
use leptos_ui::clx;

mod components {
    use super::*;
    clx! {Card, div, "bg-card text-card-foreground flex flex-col gap-3 rounded-xl border py-4 shadow-sm"}
    clx! {CardContent, div, "px-4"}
    clx! {CardDescription, p, "text-muted-foreground text-xs"}
    clx! {CardFooter, footer, "flex items-center justify-between px-4", "gap-2"}
    clx! {CardList, ul, "flex flex-col gap-3"}
    clx! {CardItem, li, "list-none"}
}

pub use components::*;
