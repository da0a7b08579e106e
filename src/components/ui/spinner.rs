use icons::Loader;
use leptos::prelude::*;
use tw_merge::tw_merge;

#[component]
pub fn Spinner(#[prop(into, optional)] class: String) -> impl IntoView {
    let merged_class = tw_merge!("size-4 animate-spin", class);

    view! { <Loader class=merged_class attr:role="status" attr:aria-label="Loading" /> }
}

/// Thin indeterminate bar pinned to the top of the viewport.
#[component]
pub fn ProgressBar(#[prop(into)] active: Signal<bool>) -> impl IntoView {
    view! {
        <div
            class="fixed inset-x-0 top-0 z-50 h-0.5 overflow-hidden"
            role="progressbar"
            aria-hidden=move || (!active.get()).to_string()
        >
            <Show when=move || active.get()>
                <div class="h-full w-1/3 animate-pulse bg-primary"></div>
            </Show>
        </div>
    }
}
